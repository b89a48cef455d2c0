// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Task operations
//!
//! One function per API operation. Each acquires its own control-plane
//! session, does its work, and releases the session on success and error
//! paths alike. Results are plain JSON values; they land verbatim in the
//! task record for clients to poll.

use std::path::Path;

use serde_json::{Value, json};
use thiserror::Error;

use crate::vsphere::{DeploySpec, VmHandle, VmMeta, Vsphere, VsphereError, VsphereSession};

/// Metadata component tag identifying instances this service owns.
pub const COMPONENT: &str = "ESXi";

#[derive(Debug, Error)]
pub enum WorkerError {
    /// An expected miss: instance, image, or network does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The request named something that cannot be used as asked.
    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Ova(#[from] ova::OvaError),

    #[error(transparent)]
    Vsphere(#[from] VsphereError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// List the user's ESXi instances as `{name: info}`.
pub async fn show_esxi(vsphere: &dyn Vsphere, username: &str) -> Result<Value, WorkerError> {
    let session = vsphere.connect().await?;
    let result = show_inner(&*session, username).await;
    session.close().await;
    result
}

async fn show_inner(session: &dyn VsphereSession, username: &str) -> Result<Value, WorkerError> {
    let mut instances = serde_json::Map::new();
    for vm in session.folder_vms(username).await? {
        let info = session.vm_info(&vm, false).await?;
        let tagged = info
            .meta
            .as_ref()
            .is_some_and(|meta| meta.component == COMPONENT);
        if tagged {
            instances.insert(vm.name, serde_json::to_value(info).map_err(internal)?);
        }
    }
    Ok(Value::Object(instances))
}

/// Deploy a new instance and return `{name: info}` once it has an IP.
pub async fn create_esxi(
    vsphere: &dyn Vsphere,
    images_dir: &Path,
    username: &str,
    name: &str,
    image: &str,
    network: &str,
) -> Result<Value, WorkerError> {
    // Resolve and open the package before touching the control plane.
    let path = images_dir.join(ova::ova_file_name(image));
    let package = tokio::task::spawn_blocking(move || ova::Ova::open(&path))
        .await
        .map_err(|e| WorkerError::Internal(e.to_string()))?
        .map_err(|e| match e {
            ova::OvaError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                WorkerError::NotFound(format!("No such image: {image}"))
            }
            other => other.into(),
        })?;

    let session = vsphere.connect().await?;
    let result = create_inner(&*session, &package, username, name, image, network).await;
    session.close().await;
    // `package` drops here, releasing the file handle on every path.
    result
}

async fn create_inner(
    session: &dyn VsphereSession,
    package: &ova::Ova,
    username: &str,
    name: &str,
    image: &str,
    network: &str,
) -> Result<Value, WorkerError> {
    // Refuse to deploy against a network that does not exist; failing
    // here leaves nothing behind to clean up.
    let networks = session.networks().await?;
    if !networks.iter().any(|n| n == network) {
        return Err(WorkerError::InvalidArgument(format!(
            "No such network: {network}"
        )));
    }

    let vm = session
        .deploy_ova(DeploySpec {
            name,
            folder: username,
            network,
            ova: package,
        })
        .await?;
    tracing::info!(vm = %vm.name, username, image, "Instance deployed");

    // Nested HV must be enabled while the VM is still powered off.
    let task = session.enable_nested_hv(&vm).await?;
    session.await_completion(task).await?;

    let task = session.power_on(&vm).await?;
    session.await_completion(task).await?;

    let meta = VmMeta {
        component: COMPONENT.to_string(),
        created: chrono::Utc::now().timestamp(),
        version: image.to_string(),
        configured: false,
        generation: 1,
    };
    session.set_meta(&vm, &meta).await?;

    let info = session.vm_info(&vm, true).await?;
    let mut result = serde_json::Map::new();
    result.insert(vm.name, serde_json::to_value(info).map_err(internal)?);
    Ok(Value::Object(result))
}

/// Power off and destroy the named instance.
pub async fn delete_esxi(
    vsphere: &dyn Vsphere,
    username: &str,
    name: &str,
) -> Result<Value, WorkerError> {
    let session = vsphere.connect().await?;
    let result = delete_inner(&*session, username, name).await;
    session.close().await;
    result
}

async fn delete_inner(
    session: &dyn VsphereSession,
    username: &str,
    name: &str,
) -> Result<Value, WorkerError> {
    let vm = find_tagged(session, username, name).await?;

    let task = session.power_off(&vm).await?;
    session.await_completion(task).await?;

    let task = session.destroy(&vm).await?;
    session.await_completion(task).await?;

    tracing::info!(vm = %name, username, "Instance destroyed");
    Ok(Value::Null)
}

/// List deployable image versions from the catalog directory.
///
/// File names map through the naming convention with no validation; a
/// stray file in the catalog shows up as a garbage version rather than
/// failing the whole listing.
pub async fn list_images(images_dir: &Path) -> Result<Value, WorkerError> {
    let mut entries = tokio::fs::read_dir(images_dir).await?;
    let mut versions = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        versions.push(ova::version_from_file_name(&file_name));
    }
    versions.sort();
    Ok(json!({ "image": versions }))
}

/// Move the named instance's NIC to another network.
pub async fn update_network(
    vsphere: &dyn Vsphere,
    username: &str,
    name: &str,
    new_network: &str,
) -> Result<Value, WorkerError> {
    let session = vsphere.connect().await?;
    let result = update_network_inner(&*session, username, name, new_network).await;
    session.close().await;
    result
}

async fn update_network_inner(
    session: &dyn VsphereSession,
    username: &str,
    name: &str,
    new_network: &str,
) -> Result<Value, WorkerError> {
    let vm = find_tagged(session, username, name).await?;

    let networks = session.networks().await?;
    if !networks.iter().any(|n| n == new_network) {
        return Err(WorkerError::NotFound(format!(
            "No network named {new_network} found"
        )));
    }

    let task = session.change_network(&vm, new_network).await?;
    session.await_completion(task).await?;

    tracing::info!(vm = %name, username, network = new_network, "Instance network changed");
    Ok(Value::Null)
}

/// Find the folder child matching `name` that carries the ESXi component
/// tag. A name match without the tag is still a miss: this service only
/// operates on instances it created.
async fn find_tagged(
    session: &dyn VsphereSession,
    username: &str,
    name: &str,
) -> Result<VmHandle, WorkerError> {
    for vm in session.folder_vms(username).await? {
        if vm.name != name {
            continue;
        }
        let info = session.vm_info(&vm, false).await?;
        let tagged = info
            .meta
            .as_ref()
            .is_some_and(|meta| meta.component == COMPONENT);
        if tagged {
            return Ok(vm);
        }
    }
    Err(WorkerError::NotFound(format!(
        "No esxi named {name} found"
    )))
}

fn internal(e: impl std::fmt::Display) -> WorkerError {
    WorkerError::Internal(e.to_string())
}
