// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! vCenter Automation API binding
//!
//! Implements the [`Vsphere`] traits against the vCenter REST
//! ("Automation") API: session login, inventory lookups, power
//! operations, content-library staging for OVA deployment, VM data-sets
//! for appliance metadata, and `cis/tasks` polling for the few
//! operations that run asynchronously server-side.
//!
//! There is no retry layer. Upstream failures surface as
//! [`VsphereError`] and propagate unmodified into task failure.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;

use super::{
    DeploySpec, PowerState, TaskRef, VmHandle, VmInfo, VmMeta, Vsphere, VsphereError,
    VsphereSession,
};

/// Session token header for the Automation API.
const SESSION_HEADER: &str = "vmware-api-session-id";

/// Data set holding appliance metadata on each VM.
const META_DATA_SET: &str = "com.vlab.appliance";

/// Key within the data set under which [`VmMeta`] is stored as JSON.
const META_KEY: &str = "meta";

/// Guest IP polling: every 5s, up to 10 minutes.
const IP_POLL_INTERVAL: Duration = Duration::from_secs(5);
const IP_POLL_ATTEMPTS: u32 = 120;

/// Remote task polling: every 2s, up to 30 minutes.
const TASK_POLL_INTERVAL: Duration = Duration::from_secs(2);
const TASK_POLL_ATTEMPTS: u32 = 900;

/// Connector that opens one Automation API session per task.
pub struct VcenterConnector {
    http: reqwest::Client,
    base: String,
    user: String,
    password: SecretString,
    library: String,
}

impl VcenterConnector {
    pub fn new(
        base: &str,
        user: &str,
        password: SecretString,
        library: &str,
        timeout: Duration,
    ) -> Result<Self, VsphereError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password,
            library: library.to_string(),
        })
    }
}

#[async_trait]
impl Vsphere for VcenterConnector {
    async fn connect(&self) -> Result<Box<dyn VsphereSession>, VsphereError> {
        let response = self
            .http
            .post(format!("{}/api/session", self.base))
            .basic_auth(&self.user, Some(self.password.expose_secret()))
            .send()
            .await?;
        let response = check(response).await?;
        let token: String = response.json().await?;

        tracing::debug!(vcenter = %self.base, "vCenter session established");

        Ok(Box::new(VcenterSession {
            http: self.http.clone(),
            base: self.base.clone(),
            token,
            library: self.library.clone(),
        }))
    }
}

/// One authenticated Automation API session.
pub struct VcenterSession {
    http: reqwest::Client,
    base: String,
    token: String,
    library: String,
}

/// Convert a non-2xx response into an [`VsphereError::Api`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, VsphereError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(VsphereError::Api {
        status: status.as_u16(),
        message,
    })
}

#[derive(Debug, Deserialize)]
struct FolderSummary {
    folder: String,
}

#[derive(Debug, Deserialize)]
struct VmSummary {
    vm: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct NetworkSummary {
    network: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct VmDetail {
    power_state: PowerState,
    #[serde(default)]
    nics: HashMap<String, NicDetail>,
}

#[derive(Debug, Deserialize)]
struct NicDetail {
    backing: NicBacking,
}

#[derive(Debug, Deserialize)]
struct NicBacking {
    #[serde(default)]
    network: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuestIdentity {
    #[serde(default)]
    ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NicSummary {
    nic: String,
}

#[derive(Debug, Deserialize)]
struct UploadFileInfo {
    upload_endpoint: UploadEndpoint,
}

#[derive(Debug, Deserialize)]
struct UploadEndpoint {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct DeployResult {
    succeeded: bool,
    #[serde(default)]
    resource_id: Option<DeployedResource>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DeployedResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CisTask {
    status: String,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl VcenterSession {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.get(self.url(path)).header(SESSION_HEADER, &self.token)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.post(self.url(path)).header(SESSION_HEADER, &self.token)
    }

    fn patch(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.patch(self.url(path)).header(SESSION_HEADER, &self.token)
    }

    fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.put(self.url(path)).header(SESSION_HEADER, &self.token)
    }

    fn delete(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .delete(self.url(path))
            .header(SESSION_HEADER, &self.token)
    }

    /// Resolve a folder name to its managed-object id.
    async fn folder_id(&self, folder: &str) -> Result<String, VsphereError> {
        let response = self
            .get("/api/vcenter/folder")
            .query(&[("names", folder), ("type", "VIRTUAL_MACHINE")])
            .send()
            .await?;
        let folders: Vec<FolderSummary> = check(response).await?.json().await?;
        folders
            .into_iter()
            .next()
            .map(|f| f.folder)
            .ok_or_else(|| VsphereError::NotFound(format!("folder {folder}")))
    }

    /// Resolve a network name to its managed-object id.
    async fn network_id(&self, network: &str) -> Result<String, VsphereError> {
        let response = self
            .get("/api/vcenter/network")
            .query(&[("names", network)])
            .send()
            .await?;
        let networks: Vec<NetworkSummary> = check(response).await?.json().await?;
        networks
            .into_iter()
            .next()
            .map(|n| n.network)
            .ok_or_else(|| VsphereError::NotFound(format!("network {network}")))
    }

    /// Network id -> name map for the whole inventory.
    async fn network_names(&self) -> Result<HashMap<String, String>, VsphereError> {
        let response = self.get("/api/vcenter/network").send().await?;
        let networks: Vec<NetworkSummary> = check(response).await?.json().await?;
        Ok(networks.into_iter().map(|n| (n.network, n.name)).collect())
    }

    /// Guest-reported IP, `None` while tools have nothing to report yet.
    async fn guest_ip(&self, vm: &VmHandle) -> Result<Option<String>, VsphereError> {
        let response = self
            .get(&format!("/api/vcenter/vm/{}/guest/identity", vm.id))
            .send()
            .await?;
        // Identity is unavailable (503) until tools come up in the guest.
        if response.status().as_u16() == 503 || response.status().as_u16() == 404 {
            return Ok(None);
        }
        let identity: GuestIdentity = check(response).await?.json().await?;
        Ok(identity.ip_address)
    }

    /// Appliance metadata from the VM's data set, `None` if absent.
    async fn get_meta(&self, vm: &VmHandle) -> Result<Option<VmMeta>, VsphereError> {
        let response = self
            .get(&format!(
                "/api/vcenter/vm/{}/data-sets/{META_DATA_SET}/entries/{META_KEY}",
                vm.id
            ))
            .send()
            .await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let raw: String = check(response).await?.json().await?;
        // A VM stamped by something else entirely may hold non-JSON here;
        // treat that the same as unstamped.
        Ok(serde_json::from_str(&raw).ok())
    }

    /// Stage the OVA into the content library as a fresh item, returning
    /// the item id. The item is deleted again after deployment.
    async fn stage_library_item(&self, spec: &DeploySpec<'_>) -> Result<String, VsphereError> {
        let response = self
            .post("/api/content/library")
            .query(&[("action", "find")])
            .json(&json!({ "spec": { "name": self.library, "type": "LOCAL" } }))
            .send()
            .await?;
        let libraries: Vec<String> = check(response).await?.json().await?;
        let library_id = libraries
            .into_iter()
            .next()
            .ok_or_else(|| VsphereError::NotFound(format!("content library {}", self.library)))?;

        let response = self
            .post("/api/content/library-item")
            .json(&json!({
                "spec": {
                    "library_id": library_id,
                    "name": format!("{}-{}", spec.name, uuid::Uuid::new_v4()),
                    "type": "ovf",
                }
            }))
            .send()
            .await?;
        let item_id: String = check(response).await?.json().await?;

        let response = self
            .post("/api/content/library-item/update-session")
            .json(&json!({ "create_spec": { "library_item_id": item_id } }))
            .send()
            .await?;
        let session_id: String = check(response).await?.json().await?;

        let file_name = spec
            .ova
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "appliance.ova".to_string());
        let response = self
            .post(&format!(
                "/api/content/library-item/update-session/{session_id}/file"
            ))
            .query(&[("action", "add")])
            .json(&json!({ "spec": { "name": file_name, "source_type": "PUSH" } }))
            .send()
            .await?;
        let file: UploadFileInfo = check(response).await?.json().await?;

        // Stream the package straight off disk; images run to several GB.
        let package = tokio::fs::File::open(spec.ova.path())
            .await
            .map_err(|e| VsphereError::NotFound(format!("{}: {e}", spec.ova.path().display())))?;
        let response = self
            .http
            .put(&file.upload_endpoint.uri)
            .header(SESSION_HEADER, &self.token)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(package)))
            .send()
            .await?;
        check(response).await?;

        let response = self
            .post(&format!(
                "/api/content/library-item/update-session/{session_id}"
            ))
            .query(&[("action", "complete")])
            .send()
            .await?;
        check(response).await?;

        Ok(item_id)
    }

    async fn drop_library_item(&self, item_id: &str) {
        let result = self
            .delete(&format!("/api/content/library-item/{item_id}"))
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(item_id, status = %response.status(), "Library item cleanup failed");
            }
            Err(e) => {
                tracing::warn!(item_id, error = %e, "Library item cleanup failed");
            }
            Ok(_) => {}
        }
    }

    async fn power_action(&self, vm: &VmHandle, action: &str) -> Result<TaskRef, VsphereError> {
        let response = self
            .post(&format!("/api/vcenter/vm/{}/power", vm.id))
            .query(&[("action", action)])
            .send()
            .await?;
        check(response).await?;
        // Power actions block server-side until the transition finishes.
        Ok(TaskRef::completed())
    }

    async fn first_nic(&self, vm: &VmHandle) -> Result<String, VsphereError> {
        let response = self
            .get(&format!("/api/vcenter/vm/{}/hardware/ethernet", vm.id))
            .send()
            .await?;
        let nics: Vec<NicSummary> = check(response).await?.json().await?;
        nics.into_iter()
            .next()
            .map(|n| n.nic)
            .ok_or_else(|| VsphereError::NotFound(format!("NIC on VM {}", vm.name)))
    }
}

#[async_trait]
impl VsphereSession for VcenterSession {
    async fn folder_vms(&self, folder: &str) -> Result<Vec<VmHandle>, VsphereError> {
        let folder_id = self.folder_id(folder).await?;
        let response = self
            .get("/api/vcenter/vm")
            .query(&[("folders", folder_id.as_str())])
            .send()
            .await?;
        let vms: Vec<VmSummary> = check(response).await?.json().await?;
        Ok(vms
            .into_iter()
            .map(|vm| VmHandle {
                id: vm.vm,
                name: vm.name,
            })
            .collect())
    }

    async fn vm_info(&self, vm: &VmHandle, ensure_ip: bool) -> Result<VmInfo, VsphereError> {
        let response = self.get(&format!("/api/vcenter/vm/{}", vm.id)).send().await?;
        let detail: VmDetail = check(response).await?.json().await?;

        let names = self.network_names().await?;
        let networks = detail
            .nics
            .values()
            .filter_map(|nic| nic.backing.network.as_ref())
            .map(|id| names.get(id).cloned().unwrap_or_else(|| id.clone()))
            .collect();

        let mut ip = self.guest_ip(vm).await?;
        if ensure_ip && ip.is_none() {
            for _ in 0..IP_POLL_ATTEMPTS {
                tokio::time::sleep(IP_POLL_INTERVAL).await;
                ip = self.guest_ip(vm).await?;
                if ip.is_some() {
                    break;
                }
            }
            if ip.is_none() {
                return Err(VsphereError::Timeout(format!(
                    "guest IP address on VM {}",
                    vm.name
                )));
            }
        }

        let meta = self.get_meta(vm).await?;

        Ok(VmInfo {
            state: detail.power_state,
            networks,
            ip,
            meta,
        })
    }

    async fn networks(&self) -> Result<Vec<String>, VsphereError> {
        let names = self.network_names().await?;
        Ok(names.into_values().collect())
    }

    async fn deploy_ova(&self, spec: DeploySpec<'_>) -> Result<VmHandle, VsphereError> {
        let folder_id = self.folder_id(spec.folder).await?;
        let network_id = self.network_id(spec.network).await?;

        // The descriptor declares the placeholder the mapping must name.
        let placeholder = spec
            .ova
            .networks()
            .first()
            .cloned()
            .ok_or_else(|| VsphereError::NotFound("network placeholder in OVF".to_string()))?;

        let mut network_mappings = serde_json::Map::new();
        network_mappings.insert(placeholder, json!(network_id));

        let item_id = self.stage_library_item(&spec).await?;
        let deploy = async {
            let response = self
                .post(&format!("/api/vcenter/ovf/library-item/{item_id}"))
                .query(&[("action", "deploy")])
                .json(&json!({
                    "target": { "folder_id": folder_id },
                    "deployment_spec": {
                        "name": spec.name,
                        "accept_all_EULA": true,
                        "network_mappings": network_mappings,
                    }
                }))
                .send()
                .await?;
            let result: DeployResult = check(response).await?.json().await?;
            if !result.succeeded {
                return Err(VsphereError::TaskFailed {
                    task: format!("deploy of {}", spec.name),
                    message: result
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no error detail".to_string()),
                });
            }
            let vm_id = result
                .resource_id
                .map(|r| r.id)
                .ok_or_else(|| VsphereError::NotFound("deployed VM id".to_string()))?;
            Ok(VmHandle {
                id: vm_id,
                name: spec.name.to_string(),
            })
        }
        .await;

        // The staged item is scratch either way.
        self.drop_library_item(&item_id).await;
        deploy
    }

    async fn power_on(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError> {
        self.power_action(vm, "start").await
    }

    async fn power_off(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError> {
        self.power_action(vm, "stop").await
    }

    async fn destroy(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError> {
        let response = self
            .delete(&format!("/api/vcenter/vm/{}", vm.id))
            .send()
            .await?;
        check(response).await?;
        Ok(TaskRef::completed())
    }

    async fn enable_nested_hv(&self, vm: &VmHandle) -> Result<TaskRef, VsphereError> {
        let response = self
            .patch(&format!("/api/vcenter/vm/{}/hardware/cpu", vm.id))
            .json(&json!({ "hardware_virtualization": true }))
            .send()
            .await?;
        check(response).await?;
        Ok(TaskRef::completed())
    }

    async fn set_meta(&self, vm: &VmHandle, meta: &VmMeta) -> Result<(), VsphereError> {
        // Create the data set if this is the first write; 400 here means
        // it already exists.
        let response = self
            .post(&format!("/api/vcenter/vm/{}/data-sets", vm.id))
            .json(&json!({
                "name": META_DATA_SET,
                "description": "Lab appliance metadata",
                "host": "NONE",
                "guest": "READ_ONLY",
            }))
            .send()
            .await?;
        if !response.status().is_success() && response.status().as_u16() != 400 {
            check(response).await?;
        }

        let payload = serde_json::to_string(meta).map_err(|e| VsphereError::Api {
            status: 0,
            message: format!("metadata serialization: {e}"),
        })?;
        let response = self
            .put(&format!(
                "/api/vcenter/vm/{}/data-sets/{META_DATA_SET}/entries/{META_KEY}",
                vm.id
            ))
            .json(&payload)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn change_network(&self, vm: &VmHandle, network: &str) -> Result<TaskRef, VsphereError> {
        let network_id = self.network_id(network).await?;
        let nic = self.first_nic(vm).await?;
        let response = self
            .patch(&format!(
                "/api/vcenter/vm/{}/hardware/ethernet/{nic}",
                vm.id
            ))
            .json(&json!({
                "backing": { "type": "STANDARD_PORTGROUP", "network": network_id }
            }))
            .send()
            .await?;
        check(response).await?;
        Ok(TaskRef::completed())
    }

    async fn await_completion(&self, task: TaskRef) -> Result<(), VsphereError> {
        let Some(task_id) = task.id() else {
            return Ok(());
        };

        for _ in 0..TASK_POLL_ATTEMPTS {
            let response = self
                .get(&format!("/api/cis/tasks/{task_id}"))
                .send()
                .await?;
            let task: CisTask = check(response).await?.json().await?;
            match task.status.as_str() {
                "SUCCEEDED" => return Ok(()),
                "FAILED" => {
                    return Err(VsphereError::TaskFailed {
                        task: task_id.to_string(),
                        message: task
                            .error
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| "no error detail".to_string()),
                    });
                }
                _ => tokio::time::sleep(TASK_POLL_INTERVAL).await,
            }
        }

        Err(VsphereError::Timeout(format!("vCenter task {task_id}")))
    }

    async fn close(&self) {
        let result = self.delete("/api/session").send().await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to release vCenter session");
        }
    }
}
