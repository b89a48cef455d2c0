// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! OVA package access
//!
//! Opens an OVA archive, locates the OVF descriptor, and extracts the
//! logical network names declared in its `NetworkSection`. The archive is
//! not unpacked; disk extents are streamed straight out of the tar by
//! whoever uploads the package.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tar::Archive;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OvaError {
    #[error("I/O error reading OVA package: {0}")]
    Io(#[from] std::io::Error),

    #[error("no OVF descriptor found in {0}")]
    MissingDescriptor(PathBuf),

    #[error("OVF descriptor is not valid UTF-8: {0}")]
    Descriptor(#[from] std::string::FromUtf8Error),
}

/// An opened OVA appliance package.
///
/// The file handle is released when the value is dropped; callers that
/// deploy from a package hold it only for the duration of the deployment.
pub struct Ova {
    path: PathBuf,
    descriptor: String,
    networks: Vec<String>,
}

impl Ova {
    /// Open a package and read its OVF descriptor.
    ///
    /// Per the OVF specification the descriptor is the first entry in the
    /// archive, so only the head of the file is read. This does blocking
    /// I/O; async callers should wrap it in `spawn_blocking`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OvaError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mut archive = Archive::new(file);

        let mut descriptor = None;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let is_ovf = entry
                .path()?
                .extension()
                .map(|ext| ext == "ovf")
                .unwrap_or(false);
            if is_ovf {
                let mut buf = Vec::new();
                entry.read_to_end(&mut buf)?;
                descriptor = Some(String::from_utf8(buf)?);
                break;
            }
        }

        let descriptor = descriptor.ok_or_else(|| OvaError::MissingDescriptor(path.clone()))?;
        let networks = parse_networks(&descriptor);

        Ok(Self {
            path,
            descriptor,
            networks,
        })
    }

    /// Path of the package file on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The package's OVF descriptor, verbatim.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Logical network names declared by the descriptor, in declaration
    /// order. Appliance packages in the catalog declare exactly one.
    pub fn networks(&self) -> &[String] {
        &self.networks
    }
}

impl std::fmt::Debug for Ova {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ova")
            .field("path", &self.path)
            .field("networks", &self.networks)
            .finish_non_exhaustive()
    }
}

/// Extract `<Network ovf:name="...">` declarations from a descriptor.
///
/// A full XML parse is overkill for pulling one attribute out of the
/// NetworkSection; descriptors are machine-generated and small.
fn parse_networks(descriptor: &str) -> Vec<String> {
    network_name_re()
        .captures_iter(descriptor)
        .map(|cap| cap[1].to_string())
        .collect()
}

// The regex is a compile-time constant; failing to parse it is a
// programming error.
#[allow(clippy::expect_used)]
fn network_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<Network\s+ovf:name="([^"]*)""#).expect("valid regex literal")
    })
}
