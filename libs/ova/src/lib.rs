// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! OVA appliance package reading
//!
//! An OVA is a plain tar archive whose first entry is an OVF descriptor
//! (XML) followed by the disk extents. This crate reads just enough of the
//! package to drive a deployment:
//!
//! - the OVF descriptor itself, and
//! - the logical network names the descriptor declares, which a deployment
//!   must map onto real networks in the control plane.
//!
//! It also owns the `esxi-<version>.ova` naming convention used by the
//! image catalog, so the filename/version mapping lives in one place.

mod naming;
mod package;

pub use naming::{ova_file_name, version_from_file_name};
pub use package::{Ova, OvaError};
