// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! ESXi Service Library
//!
//! HTTP facade over a task pipeline for virtual ESXi appliances. Request
//! handlers authenticate the caller, validate the body, enqueue a worker
//! task, and answer immediately with the task id; clients poll the task
//! endpoint (advertised in a `Link` header) for the outcome.
//!
//! # Modules
//!
//! - [`auth`] - `X-Auth` bearer token verification
//! - [`config`] - Service configuration from environment variables
//! - [`context`] - API context for request handlers
//! - [`tasks`] - In-process task registry
//! - [`vsphere`] - Control-plane interface and vCenter binding
//! - [`worker`] - The task operations themselves
//! - [`metrics`] - Prometheus metrics

pub mod auth;
pub mod config;
pub mod context;
pub mod metrics;
pub mod tasks;
pub mod vsphere;
pub mod worker;

use dropshot::{
    Body, ClientErrorStatusCode, HttpError, HttpResponseOk, Path, RequestContext, UntypedBody,
};
use esxi_api::{
    CreateEsxiParams, DeleteEsxiParams, EsxiApi, HealthInfo, TaskAccepted, TaskIdContent,
    TaskPath, TaskStatus, UpdateNetworkParams,
};
use http::Response;
use serde::de::DeserializeOwned;

use crate::auth::Claims;
use crate::context::ApiContext;

/// ESXi Service API implementation
///
/// This enum serves as the implementation type for the `EsxiApi` trait.
/// It contains no data - all state is stored in the `ApiContext`.
pub enum EsxiServiceImpl {}

/// Authenticate the request, or fail with 401.
///
/// This runs before any body validation: a caller with a bad token gets
/// 401 even when the body would also have been rejected.
fn require_auth(rqctx: &RequestContext<ApiContext>) -> Result<Claims, HttpError> {
    let ctx = rqctx.context();
    auth::authenticate(rqctx.request.headers(), &ctx.config.auth_secret).map_err(|e| {
        metrics::record_auth_failure();
        tracing::debug!(error = %e, "Rejected request");
        HttpError::for_client_error(None, ClientErrorStatusCode::UNAUTHORIZED, e.to_string())
    })
}

/// Parse a request body, or fail with 400. Unknown fields are rejected.
fn parse_body<T: DeserializeOwned>(body: &UntypedBody) -> Result<T, HttpError> {
    serde_json::from_slice(body.as_bytes())
        .map_err(|e| HttpError::for_bad_request(None, format!("Invalid request body: {e}")))
}

/// Build the enqueue response: the task-id envelope plus a `Link` header
/// pointing at the task's status URL.
fn task_response(ctx: &ApiContext, task_id: String) -> Result<Response<Body>, HttpError> {
    let envelope = TaskAccepted {
        content: TaskIdContent {
            task_id: task_id.clone(),
        },
        error: None,
    };
    let body = serde_json::to_string(&envelope)
        .map_err(|e| HttpError::for_internal_error(format!("Failed to encode response: {e}")))?;

    Response::builder()
        .status(200)
        .header("Content-Type", "application/json")
        .header("Link", ctx.task_link(&task_id))
        .body(body.into())
        .map_err(|e| HttpError::for_internal_error(format!("Failed to build response: {e}")))
}

impl EsxiApi for EsxiServiceImpl {
    type Context = ApiContext;

    async fn list_instances(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError> {
        let claims = require_auth(&rqctx)?;
        let ctx = rqctx.context();

        tracing::info!(username = %claims.username, "Enqueueing instance listing");
        let task_id = ctx.enqueue_show(claims.username).await;
        task_response(ctx, task_id)
    }

    async fn create_instance(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError> {
        let claims = require_auth(&rqctx)?;
        let params: CreateEsxiParams = parse_body(&body)?;
        let ctx = rqctx.context();

        tracing::info!(
            username = %claims.username,
            name = %params.name,
            image = %params.image,
            network = %params.network,
            "Enqueueing instance creation"
        );
        let task_id = ctx.enqueue_create(claims.username, params).await;
        task_response(ctx, task_id)
    }

    async fn delete_instance(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError> {
        let claims = require_auth(&rqctx)?;
        let params: DeleteEsxiParams = parse_body(&body)?;
        let ctx = rqctx.context();

        tracing::info!(
            username = %claims.username,
            name = %params.name,
            "Enqueueing instance deletion"
        );
        let task_id = ctx.enqueue_delete(claims.username, params).await;
        task_response(ctx, task_id)
    }

    async fn list_images(
        rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError> {
        let claims = require_auth(&rqctx)?;
        let ctx = rqctx.context();

        tracing::info!(username = %claims.username, "Enqueueing image listing");
        let task_id = ctx.enqueue_images().await;
        task_response(ctx, task_id)
    }

    async fn update_network(
        rqctx: RequestContext<Self::Context>,
        body: UntypedBody,
    ) -> Result<Response<Body>, HttpError> {
        let claims = require_auth(&rqctx)?;
        let params: UpdateNetworkParams = parse_body(&body)?;
        let ctx = rqctx.context();

        tracing::info!(
            username = %claims.username,
            name = %params.name,
            new_network = %params.new_network,
            "Enqueueing network update"
        );
        let task_id = ctx.enqueue_update_network(claims.username, params).await;
        task_response(ctx, task_id)
    }

    async fn get_task(
        rqctx: RequestContext<Self::Context>,
        path: Path<TaskPath>,
    ) -> Result<HttpResponseOk<TaskStatus>, HttpError> {
        require_auth(&rqctx)?;
        let ctx = rqctx.context();
        let id = path.into_inner().id;

        let status = ctx
            .task_status(&id)
            .await
            .ok_or_else(|| HttpError::for_not_found(None, format!("No task with id {id}")))?;

        Ok(HttpResponseOk(status))
    }

    async fn healthcheck(
        _rqctx: RequestContext<Self::Context>,
    ) -> Result<HttpResponseOk<HealthInfo>, HttpError> {
        Ok(HttpResponseOk(HealthInfo {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }))
    }

    async fn get_metrics(
        _rqctx: RequestContext<Self::Context>,
    ) -> Result<Response<Body>, HttpError> {
        Response::builder()
            .status(200)
            .header("Content-Type", "text/plain; version=0.0.4")
            .body(metrics::gather_metrics().into())
            .map_err(|e| HttpError::for_internal_error(format!("Failed to build response: {e}")))
    }
}
