// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! API context for request handlers
//!
//! Shared state behind every endpoint: the immutable configuration, the
//! control-plane connector, and the task registry. Handlers validate and
//! enqueue; all real work happens in worker tasks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use esxi_api::{CreateEsxiParams, DeleteEsxiParams, TaskStatus, UpdateNetworkParams};

use crate::config::EsxiConfig;
use crate::tasks::TaskRegistry;
use crate::vsphere::{VcenterConnector, Vsphere};
use crate::worker;

pub struct ApiContext {
    pub config: Arc<EsxiConfig>,
    vsphere: Arc<dyn Vsphere>,
    tasks: Arc<TaskRegistry>,
}

impl ApiContext {
    /// Create a context backed by the real vCenter Automation API.
    pub fn new(config: EsxiConfig) -> Result<Self> {
        let connector = VcenterConnector::new(
            &config.vcenter_url,
            &config.vcenter_user,
            config.vcenter_password.clone(),
            &config.vcenter_library,
            Duration::from_secs(config.http_timeout_secs),
        )
        .context("Failed to create vCenter client")?;
        Ok(Self::with_backend(config, Arc::new(connector)))
    }

    /// Create a context with an explicit control-plane backend. Used by
    /// the integration tests to substitute a fake.
    pub fn with_backend(config: EsxiConfig, vsphere: Arc<dyn Vsphere>) -> Self {
        let tasks = Arc::new(TaskRegistry::new(Duration::from_secs(
            config.task_retention_secs,
        )));
        Self {
            config: Arc::new(config),
            vsphere,
            tasks,
        }
    }

    /// Enqueue a listing of the caller's instances.
    pub async fn enqueue_show(&self, username: String) -> String {
        let vsphere = Arc::clone(&self.vsphere);
        self.tasks
            .spawn("show", async move {
                worker::show_esxi(&*vsphere, &username).await
            })
            .await
    }

    /// Enqueue an instance creation.
    pub async fn enqueue_create(&self, username: String, params: CreateEsxiParams) -> String {
        let vsphere = Arc::clone(&self.vsphere);
        let images_dir = self.config.images_dir.clone();
        self.tasks
            .spawn("create", async move {
                worker::create_esxi(
                    &*vsphere,
                    &images_dir,
                    &username,
                    &params.name,
                    &params.image,
                    &params.network,
                )
                .await
            })
            .await
    }

    /// Enqueue an instance deletion.
    pub async fn enqueue_delete(&self, username: String, params: DeleteEsxiParams) -> String {
        let vsphere = Arc::clone(&self.vsphere);
        self.tasks
            .spawn("delete", async move {
                worker::delete_esxi(&*vsphere, &username, &params.name).await
            })
            .await
    }

    /// Enqueue an image catalog listing.
    pub async fn enqueue_images(&self) -> String {
        let images_dir = self.config.images_dir.clone();
        self.tasks
            .spawn("images", async move { worker::list_images(&images_dir).await })
            .await
    }

    /// Enqueue a network reattachment.
    pub async fn enqueue_update_network(
        &self,
        username: String,
        params: UpdateNetworkParams,
    ) -> String {
        let vsphere = Arc::clone(&self.vsphere);
        self.tasks
            .spawn("update_network", async move {
                worker::update_network(&*vsphere, &username, &params.name, &params.new_network)
                    .await
            })
            .await
    }

    /// Status of a previously enqueued task.
    pub async fn task_status(&self, id: &str) -> Option<TaskStatus> {
        self.tasks.status(id).await
    }

    /// `Link` header value pointing a client at the task's status URL.
    pub fn task_link(&self, task_id: &str) -> String {
        format!(
            "<{}/api/1/inf/esxi/task/{}>; rel=status",
            self.config.external_url, task_id
        )
    }
}
