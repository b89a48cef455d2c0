// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! The `esxi-<version>.ova` naming convention
//!
//! Image files in the catalog encode the appliance version in the filename;
//! e.g. `esxi-6.7u1.ova` holds version `6.7u1`. The mapping is bidirectional
//! and lossless for well-formed names.

/// Filename prefix for appliance packages in the image catalog.
const PREFIX: &str = "esxi-";

/// Filename suffix for appliance packages in the image catalog.
const SUFFIX: &str = ".ova";

/// Convert an appliance version into its catalog filename.
///
/// `"6.7u1"` becomes `"esxi-6.7u1.ova"`.
pub fn ova_file_name(version: &str) -> String {
    format!("{PREFIX}{version}{SUFFIX}")
}

/// Convert a catalog filename back into the appliance version it holds.
///
/// `"esxi-6.7u1.ova"` becomes `"6.7u1"`. This is the exact inverse of
/// [`ova_file_name`] for any version containing neither `/` nor the
/// literal `.ova`.
///
/// Filenames that do not follow the convention are passed through with
/// whatever prefix/suffix happens to match stripped; no validation is
/// performed here. Catalog directories are expected to contain only
/// well-formed packages.
pub fn version_from_file_name(file_name: &str) -> String {
    let stem = file_name.strip_suffix(SUFFIX).unwrap_or(file_name);
    stem.strip_prefix(PREFIX).unwrap_or(stem).to_string()
}
