// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Dropshot API trait for the virtual ESXi appliance service.
//!
//! The service is a thin facade over an in-process task queue: every
//! instance operation is validated, enqueued, and answered immediately
//! with a task id. The actual work runs in the background against the
//! vCenter control plane; clients follow the `Link` response header to
//! the task endpoint and poll for the result.
//!
//! ## Endpoints
//!
//! - `GET /api/1/inf/esxi` - List the caller's instances (enqueues a task)
//! - `POST /api/1/inf/esxi` - Create an instance (enqueues a task)
//! - `DELETE /api/1/inf/esxi` - Delete an instance (enqueues a task)
//! - `GET /api/1/inf/esxi/image` - List deployable images (enqueues a task)
//! - `PUT /api/1/inf/esxi/network` - Move an instance to another network
//!   (enqueues a task)
//! - `GET /api/1/inf/esxi/task/{id}` - Task status and result
//! - `GET /api/1/inf/esxi/healthcheck` - Liveness and version
//! - `GET /metrics` - Prometheus metrics
//!
//! All endpoints except healthcheck and metrics require a bearer token in
//! the `X-Auth` header. Authentication is checked before request bodies
//! are validated; validation failures never enqueue a task.
//!
//! Request bodies arrive as [`dropshot::UntypedBody`] rather than
//! `TypedBody` so handlers can enforce that ordering (auth first, then
//! body validation) themselves.

use dropshot::{Body, HttpError, HttpResponseOk, Path, RequestContext, UntypedBody};
use http::Response;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Path parameters for the task status endpoint.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskPath {
    /// The task UUID
    pub id: String,
}

/// Body of a `POST /api/1/inf/esxi` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateEsxiParams {
    /// Name of the new instance, unique within the caller's folder
    pub name: String,
    /// Version of the appliance image to deploy (e.g. "6.7u1")
    pub image: String,
    /// Name of the network to attach the instance to
    pub network: String,
}

/// Body of a `DELETE /api/1/inf/esxi` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DeleteEsxiParams {
    /// Name of the instance to delete
    pub name: String,
}

/// Body of a `PUT /api/1/inf/esxi/network` request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateNetworkParams {
    /// Name of the instance to reattach
    pub name: String,
    /// Name of the network to move the instance to
    #[serde(rename = "new-network")]
    pub new_network: String,
}

/// Response envelope returned by every enqueue endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskAccepted {
    pub content: TaskIdContent,
    pub error: Option<String>,
}

/// The task id assigned at enqueue time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskIdContent {
    #[serde(rename = "task-id")]
    pub task_id: String,
}

/// Lifecycle state of an enqueued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Complete,
    Failed,
}

/// Status of a task as reported by the polling endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TaskStatus {
    /// Current lifecycle state
    pub state: TaskState,
    /// Operation result, present once the task is complete
    pub result: Option<serde_json::Value>,
    /// Failure message, present once the task has failed
    pub error: Option<String>,
}

/// Healthcheck response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HealthInfo {
    /// Always "ok" when the service can answer at all
    pub status: String,
    /// Service version
    pub version: String,
}

/// Virtual ESXi appliance API
///
/// Creates and manages virtual ESXi instances inside a user's lab folder.
/// Mutating operations run asynchronously; use the returned task id (or
/// the `Link` header) to poll for the outcome.
#[dropshot::api_description]
pub trait EsxiApi {
    /// Context type for request handlers
    type Context: Send + Sync + 'static;

    /// List the caller's ESXi instances
    ///
    /// Enqueues a task that collects every instance in the caller's folder
    /// tagged as an ESXi appliance. The task result maps instance name to
    /// its info record.
    ///
    /// Returns 200 with a task id and a `Link` header pointing at the
    /// task status endpoint. Returns 401 without a valid `X-Auth` token.
    #[endpoint {
        method = GET,
        path = "/api/1/inf/esxi",
        tags = ["esxi"],
    }]
    async fn list_instances(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError>;

    /// Create a new ESXi instance
    ///
    /// Enqueues a task that deploys the requested image version into the
    /// caller's folder, attached to the requested network. The task result
    /// maps the assigned instance name to its info record.
    ///
    /// Returns 200 with a task id and a `Link` header. Returns 401 without
    /// a valid `X-Auth` token, 400 if the body does not match
    /// [`CreateEsxiParams`].
    #[endpoint {
        method = POST,
        path = "/api/1/inf/esxi",
        tags = ["esxi"],
    }]
    async fn create_instance(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError>;

    /// Delete an ESXi instance
    ///
    /// Enqueues a task that powers off and destroys the named instance.
    /// The task fails with a not-found error if the caller has no ESXi
    /// instance by that name.
    ///
    /// Returns 200 with a task id and a `Link` header. Returns 401 without
    /// a valid `X-Auth` token, 400 if the body does not match
    /// [`DeleteEsxiParams`].
    #[endpoint {
        method = DELETE,
        path = "/api/1/inf/esxi",
        tags = ["esxi"],
    }]
    async fn delete_instance(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError>;

    /// List deployable image versions
    ///
    /// Enqueues a task that reads the image catalog and returns the
    /// available appliance versions.
    ///
    /// Returns 200 with a task id and a `Link` header. Returns 401 without
    /// a valid `X-Auth` token.
    #[endpoint {
        method = GET,
        path = "/api/1/inf/esxi/image",
        tags = ["esxi"],
    }]
    async fn list_images(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError>;

    /// Move an instance to another network
    ///
    /// Enqueues a task that reattaches the named instance's network
    /// interface to the named network. The task fails with a not-found
    /// error if the instance or the network does not exist.
    ///
    /// Returns 200 with a task id and a `Link` header. Returns 401 without
    /// a valid `X-Auth` token, 400 if the body does not match
    /// [`UpdateNetworkParams`].
    #[endpoint {
        method = PUT,
        path = "/api/1/inf/esxi/network",
        tags = ["esxi"],
    }]
    async fn update_network(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError>;

    /// Get task status
    ///
    /// Returns the state of an enqueued task plus its result (once
    /// complete) or failure message (once failed). Completed tasks are
    /// retained for a bounded window and then expire.
    ///
    /// Returns 404 for an unknown or expired task id. Returns 401 without
    /// a valid `X-Auth` token.
    #[endpoint {
        method = GET,
        path = "/api/1/inf/esxi/task/{id}",
        tags = ["esxi"],
    }]
    async fn get_task(
        rqctx: RequestContext<Self::Context>,
        path: Path<TaskPath>,
    ) -> Result<HttpResponseOk<TaskStatus>, HttpError>;

    /// Service healthcheck
    ///
    /// Liveness probe; requires no authentication.
    #[endpoint {
        method = GET,
        path = "/api/1/inf/esxi/healthcheck",
        tags = ["esxi"],
    }]
    async fn healthcheck(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<HealthInfo>, HttpError>;

    /// Prometheus metrics
    ///
    /// Metrics in Prometheus text exposition format; requires no
    /// authentication.
    #[endpoint {
        method = GET,
        path = "/metrics",
        tags = ["internal"],
    }]
    async fn get_metrics(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError>;
}
