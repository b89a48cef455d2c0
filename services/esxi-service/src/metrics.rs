// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! Prometheus metrics for the ESXi service
//!
//! Exports metrics for monitoring the task pipeline:
//! - Tasks by operation and outcome
//! - Task execution time
//! - Rejected requests (authentication failures)

use prometheus::{Counter, CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

// Static metric initialization uses expect because these are compile-time
// constant definitions that cannot fail in practice. If they do fail, it indicates
// a programming error (e.g., invalid metric name) that should cause a panic at startup.
//
// This module exists to scope the clippy allow attributes to just the metric definitions.
#[allow(clippy::expect_used)]
mod metrics_impl {
    use super::*;
    use lazy_static::lazy_static;

    lazy_static! {
        /// Registry for all service metrics
        pub static ref REGISTRY: Registry = Registry::new();

        /// Tasks finished, by operation and outcome (complete, failed)
        pub static ref TASKS_TOTAL: CounterVec = CounterVec::new(
            Opts::new("esxi_service_tasks_total", "Tasks finished by operation and outcome"),
            &["op", "outcome"]
        ).expect("valid metric name and labels");

        /// Task execution time by operation
        pub static ref TASK_DURATION: HistogramVec = HistogramVec::new(
            HistogramOpts::new(
                "esxi_service_task_duration_seconds",
                "Task execution time in seconds"
            )
            // Buckets: 1s, 5s, 10s, 30s, 1m, 2m, 5m, 10m, 30m
            .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
            &["op"]
        ).expect("valid histogram opts");

        /// Requests rejected at the door for a missing or invalid token
        pub static ref AUTH_FAILURES: Counter = Counter::with_opts(
            Opts::new("esxi_service_auth_failures_total", "Rejected X-Auth tokens")
        ).expect("valid metric name");
    }
}

pub use metrics_impl::{AUTH_FAILURES, REGISTRY, TASK_DURATION, TASKS_TOTAL};

/// Register all metrics with the registry
///
/// Should be called once during application startup.
/// Panics if registration fails (indicates a programming error).
#[allow(clippy::expect_used)]
pub fn register_metrics() {
    REGISTRY
        .register(Box::new(TASKS_TOTAL.clone()))
        .expect("Failed to register TASKS_TOTAL");
    REGISTRY
        .register(Box::new(TASK_DURATION.clone()))
        .expect("Failed to register TASK_DURATION");
    REGISTRY
        .register(Box::new(AUTH_FAILURES.clone()))
        .expect("Failed to register AUTH_FAILURES");
}

/// Get metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

/// Record a task that finished successfully
pub fn record_task_complete(op: &str, duration_secs: f64) {
    TASKS_TOTAL.with_label_values(&[op, "complete"]).inc();
    TASK_DURATION.with_label_values(&[op]).observe(duration_secs);
}

/// Record a task that finished in failure
pub fn record_task_failed(op: &str, duration_secs: f64) {
    TASKS_TOTAL.with_label_values(&[op, "failed"]).inc();
    TASK_DURATION.with_label_values(&[op]).observe(duration_secs);
}

/// Record a request rejected for authentication reasons
pub fn record_auth_failure() {
    AUTH_FAILURES.inc();
}
