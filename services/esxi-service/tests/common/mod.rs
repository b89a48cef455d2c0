// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Shared test fixtures: a recording in-memory control plane and an OVA
//! builder for image catalog fixtures.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
// Not every test file uses every fixture.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use esxi_service::vsphere::{
    DeploySpec, PowerState, TaskRef, VmHandle, VmInfo, VmMeta, Vsphere, VsphereError,
    VsphereSession,
};

/// One VM in the fake inventory.
#[derive(Debug, Clone)]
pub struct FakeVm {
    pub folder: String,
    pub handle: VmHandle,
    pub info: VmInfo,
}

/// Mutable world state shared by the connector and its sessions.
#[derive(Debug, Default)]
pub struct FakeState {
    pub vms: Vec<FakeVm>,
    pub networks: Vec<String>,
    /// Every session call, in order, e.g. `"power_off vm-1"`.
    pub calls: Vec<String>,
    next_id: u32,
}

impl FakeState {
    fn record(&mut self, call: String) {
        self.calls.push(call);
    }
}

/// In-memory control plane that records every call it sees.
#[derive(Debug, Default)]
pub struct FakeVsphere {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeVsphere {
    pub fn new(networks: &[&str]) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().networks =
            networks.iter().map(|n| n.to_string()).collect();
        fake
    }

    /// Seed a VM into a user's folder.
    pub fn add_vm(&self, folder: &str, name: &str, meta: Option<VmMeta>) -> VmHandle {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let handle = VmHandle {
            id: format!("vm-{}", state.next_id),
            name: name.to_string(),
        };
        let networks = state.networks.clone();
        state.vms.push(FakeVm {
            folder: folder.to_string(),
            handle: handle.clone(),
            info: VmInfo {
                state: PowerState::PoweredOn,
                networks,
                ip: Some("192.168.1.50".to_string()),
                meta,
            },
        });
        handle
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls matching a prefix, e.g. all `"destroy ..."` entries.
    pub fn calls_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

/// Metadata matching what the service stamps on its instances.
pub fn esxi_meta(version: &str) -> VmMeta {
    VmMeta {
        component: "ESXi".to_string(),
        created: 1_760_000_000,
        version: version.to_string(),
        configured: false,
        generation: 1,
    }
}

#[async_trait]
impl Vsphere for FakeVsphere {
    async fn connect(&self) -> Result<Box<dyn VsphereSession>, VsphereError> {
        self.state.lock().unwrap().record("connect".to_string());
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct FakeSession {
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl VsphereSession for FakeSession {
    async fn folder_vms(&self, folder: &str) -> Result<Vec<VmHandle>, VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("folder_vms {folder}"));
        Ok(state
            .vms
            .iter()
            .filter(|vm| vm.folder == folder)
            .map(|vm| vm.handle.clone())
            .collect())
    }

    async fn vm_info(&self, vm: &VmHandle, ensure_ip: bool) -> Result<VmInfo, VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("vm_info {} ensure_ip={ensure_ip}", vm.id));
        let mut info = state
            .vms
            .iter()
            .find(|candidate| candidate.handle.id == vm.id)
            .map(|candidate| candidate.info.clone())
            .ok_or_else(|| VsphereError::NotFound(format!("VM {}", vm.id)))?;
        if ensure_ip && info.ip.is_none() {
            info.ip = Some("192.168.1.51".to_string());
        }
        Ok(info)
    }

    async fn networks(&self) -> Result<Vec<String>, VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record("networks".to_string());
        Ok(state.networks.clone())
    }

    async fn deploy_ova(&self, spec: DeploySpec<'_>) -> Result<VmHandle, VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("deploy {}", spec.name));
        state.next_id += 1;
        let handle = VmHandle {
            id: format!("vm-{}", state.next_id),
            name: spec.name.to_string(),
        };
        state.vms.push(FakeVm {
            folder: spec.folder.to_string(),
            handle: handle.clone(),
            info: VmInfo {
                state: PowerState::PoweredOff,
                networks: vec![spec.network.to_string()],
                ip: None,
                meta: None,
            },
        });
        Ok(handle)
    }

    async fn power_on(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("power_on {}", vm.id));
        if let Some(entry) = state.vms.iter_mut().find(|e| e.handle.id == vm.id) {
            entry.info.state = PowerState::PoweredOn;
        }
        Ok(TaskRef::remote(format!("task-on-{}", vm.id)))
    }

    async fn power_off(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("power_off {}", vm.id));
        if let Some(entry) = state.vms.iter_mut().find(|e| e.handle.id == vm.id) {
            entry.info.state = PowerState::PoweredOff;
        }
        Ok(TaskRef::remote(format!("task-off-{}", vm.id)))
    }

    async fn destroy(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("destroy {}", vm.id));
        state.vms.retain(|entry| entry.handle.id != vm.id);
        Ok(TaskRef::remote(format!("task-destroy-{}", vm.id)))
    }

    async fn enable_nested_hv(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("enable_nested_hv {}", vm.id));
        Ok(TaskRef::remote(format!("task-hv-{}", vm.id)))
    }

    async fn set_meta(&self, vm: &VmHandle, meta: &VmMeta) -> Result<(), VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("set_meta {}", vm.id));
        if let Some(entry) = state.vms.iter_mut().find(|e| e.handle.id == vm.id) {
            entry.info.meta = Some(meta.clone());
        }
        Ok(())
    }

    async fn change_network(&self, vm: &VmHandle, network: &str) -> Result<TaskRef, VsphereError> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("change_network {} {network}", vm.id));
        if let Some(entry) = state.vms.iter_mut().find(|e| e.handle.id == vm.id) {
            entry.info.networks = vec![network.to_string()];
        }
        Ok(TaskRef::remote(format!("task-net-{}", vm.id)))
    }

    async fn await_completion(&self, task: TaskRef) -> Result<(), VsphereError> {
        let mut state = self.state.lock().unwrap();
        match task.id() {
            Some(id) => state.record(format!("await {id}")),
            None => state.record("await completed".to_string()),
        }
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().unwrap().record("close".to_string());
    }
}

const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Envelope xmlns="http://schemas.dmtf.org/ovf/envelope/1"
          xmlns:ovf="http://schemas.dmtf.org/ovf/envelope/1">
  <NetworkSection>
    <Info>The list of logical networks</Info>
    <Network ovf:name="VM Network">
      <Description>The VM Network network</Description>
    </Network>
  </NetworkSection>
</Envelope>
"#;

/// Write a minimal but structurally valid OVA into `dir`.
pub fn write_ova(dir: &Path, file_name: &str) -> PathBuf {
    let path = dir.join(file_name);
    let file = std::fs::File::create(&path).unwrap();
    let mut builder = tar::Builder::new(file);

    let mut header = tar::Header::new_gnu();
    header.set_size(DESCRIPTOR.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "appliance.ovf", DESCRIPTOR.as_bytes())
        .unwrap();

    let disk = b"not really a vmdk";
    let mut header = tar::Header::new_gnu();
    header.set_size(disk.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "appliance-disk1.vmdk", &disk[..])
        .unwrap();

    builder.finish().unwrap();
    path
}
