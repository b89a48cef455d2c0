// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Control-plane interface
//!
//! The worker talks to vCenter through the [`Vsphere`] / [`VsphereSession`]
//! trait pair rather than a concrete client, so tests can substitute a
//! recording fake. Each task acquires its own session via
//! [`Vsphere::connect`], runs to completion, and releases it with
//! [`VsphereSession::close`] on both success and error paths.
//!
//! Conceptually-asynchronous control-plane operations return a [`TaskRef`];
//! callers funnel every mutating call through
//! [`VsphereSession::await_completion`] so they never observe a
//! half-finished operation. Operations the Automation API completes
//! synchronously return an already-completed `TaskRef`, which
//! `await_completion` accepts as a no-op.

mod client;

use async_trait::async_trait;
use ova::Ova;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::VcenterConnector;

#[derive(Debug, Error)]
pub enum VsphereError {
    #[error("vCenter transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("vCenter API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("{0} not found in vCenter inventory")]
    NotFound(String),

    #[error("vCenter task {task} failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("timed out waiting for {0}")]
    Timeout(String),
}

/// A VM in the inventory: its managed-object id plus display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmHandle {
    pub id: String,
    pub name: String,
}

/// Appliance metadata stamped on a VM at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmMeta {
    /// Appliance kind, e.g. "ESXi"
    pub component: String,
    /// Creation time, unix seconds
    pub created: i64,
    /// Appliance image version the VM was deployed from
    pub version: String,
    /// Whether post-deploy configuration has been applied
    pub configured: bool,
    /// Metadata schema generation
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

/// Everything a client sees about one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmInfo {
    pub state: PowerState,
    /// Names of the networks the VM's NICs are attached to
    pub networks: Vec<String>,
    /// Guest-reported IP address, if the guest has one yet
    pub ip: Option<String>,
    /// Appliance metadata; `None` for VMs this service never stamped
    pub meta: Option<VmMeta>,
}

/// Parameters for deploying an OVA into a user's folder.
#[derive(Debug)]
pub struct DeploySpec<'a> {
    /// Name for the new VM
    pub name: &'a str,
    /// The user's folder
    pub folder: &'a str,
    /// Network to map the package's network placeholder onto
    pub network: &'a str,
    /// The opened appliance package
    pub ova: &'a Ova,
}

/// Reference to a control-plane operation that may still be running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef(Option<String>);

impl TaskRef {
    /// An operation the control plane already finished synchronously.
    pub fn completed() -> Self {
        Self(None)
    }

    /// An operation still running remotely under the given task id.
    pub fn remote(id: impl Into<String>) -> Self {
        Self(Some(id.into()))
    }

    /// Remote task id, if the operation is still running.
    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Session factory; one implementation per control plane.
#[async_trait]
pub trait Vsphere: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn VsphereSession>, VsphereError>;
}

/// One authenticated control-plane session.
#[async_trait]
pub trait VsphereSession: Send + Sync {
    /// VMs directly inside the named folder.
    async fn folder_vms(&self, folder: &str) -> Result<Vec<VmHandle>, VsphereError>;

    /// Info for one VM. With `ensure_ip`, block until the guest reports
    /// an IP address (or the implementation gives up).
    async fn vm_info(&self, vm: &VmHandle, ensure_ip: bool) -> Result<VmInfo, VsphereError>;

    /// Names of all networks visible to the service account.
    async fn networks(&self) -> Result<Vec<String>, VsphereError>;

    /// Deploy an OVA, powered off. Returns the new VM.
    async fn deploy_ova(&self, spec: DeploySpec<'_>) -> Result<VmHandle, VsphereError>;

    async fn power_on(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError>;

    async fn power_off(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError>;

    async fn destroy(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError>;

    /// Expose hardware-assisted virtualization to the guest.
    async fn enable_nested_hv(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError>;

    /// Stamp appliance metadata on the VM.
    async fn set_meta(&self, vm: &VmHandle, meta: &VmMeta) -> Result<(), VsphereError>;

    /// Reattach the VM's first NIC to the named network.
    async fn change_network(&self, vm: &VmHandle, network: &str) -> Result<TaskRef, VsphereError>;

    /// Block until a control-plane task finishes; a completed `TaskRef`
    /// returns immediately.
    async fn await_completion(&self, task: TaskRef) -> Result<(), VsphereError>;

    /// Release the session. Takes `&self` so it can run on both success
    /// and error paths without consuming the boxed session.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn task_ref_distinguishes_sync_from_remote() {
        assert_eq!(TaskRef::completed().id(), None);
        assert_eq!(TaskRef::remote("task-42").id(), Some("task-42"));
    }

    #[test]
    fn power_state_uses_vcenter_wire_names() {
        assert_eq!(
            serde_json::to_string(&PowerState::PoweredOn).unwrap(),
            "\"POWERED_ON\""
        );
        let state: PowerState = serde_json::from_str("\"POWERED_OFF\"").unwrap();
        assert_eq!(state, PowerState::PoweredOff);
    }
}
