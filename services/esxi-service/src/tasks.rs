// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! In-process task registry
//!
//! Every API operation is executed as a background task: the handler
//! assigns a UUID, spawns the work onto the tokio runtime, and returns
//! the id immediately. Clients poll the task endpoint for the outcome.
//!
//! Finished records are kept for a retention window so slow pollers can
//! still see their result, then pruned lazily on the next registry
//! access. There is no persistence; a restart forgets in-flight and
//! finished tasks alike.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use esxi_api::{TaskState, TaskStatus};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metrics;

#[derive(Debug)]
struct TaskRecord {
    op: &'static str,
    state: TaskState,
    result: Option<serde_json::Value>,
    error: Option<String>,
    finished_at: Option<Instant>,
}

/// Registry of every task this process has spawned and not yet expired.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<Uuid, TaskRecord>>,
    retention: Duration,
}

impl TaskRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Spawn `work` as a background task and return its assigned id.
    ///
    /// The future runs detached; its outcome is recorded in the registry
    /// and surfaced through [`status`](Self::status). `op` labels the
    /// operation for logging and metrics.
    ///
    /// The pending record is inserted before this returns, so the id is
    /// immediately pollable.
    pub async fn spawn<F, E>(self: &Arc<Self>, op: &'static str, work: F) -> String
    where
        F: Future<Output = Result<serde_json::Value, E>> + Send + 'static,
        E: std::fmt::Display + Send,
    {
        let id = Uuid::new_v4();
        self.insert(id, op).await;

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            registry.mark_running(id).await;
            tracing::info!(task_id = %id, op, "Task started");

            let started = Instant::now();
            let outcome = work.await;
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                Ok(result) => {
                    tracing::info!(task_id = %id, op, "Task complete");
                    metrics::record_task_complete(op, elapsed);
                    registry.finish(id, Ok(result)).await;
                }
                Err(e) => {
                    let msg = e.to_string();
                    tracing::warn!(task_id = %id, op, error = %msg, "Task failed");
                    metrics::record_task_failed(op, elapsed);
                    registry.finish(id, Err(msg)).await;
                }
            }
        });

        id.to_string()
    }

    /// Look up a task's status. Returns `None` for ids that were never
    /// assigned or whose records have expired.
    pub async fn status(&self, id: &str) -> Option<TaskStatus> {
        let id = Uuid::parse_str(id).ok()?;

        self.prune().await;

        let tasks = self.tasks.read().await;
        tasks.get(&id).map(|record| TaskStatus {
            state: record.state,
            result: record.result.clone(),
            error: record.error.clone(),
        })
    }

    async fn insert(&self, id: Uuid, op: &'static str) {
        let mut tasks = self.tasks.write().await;
        tasks.insert(
            id,
            TaskRecord {
                op,
                state: TaskState::Pending,
                result: None,
                error: None,
                finished_at: None,
            },
        );
    }

    async fn mark_running(&self, id: Uuid) {
        let mut tasks = self.tasks.write().await;
        if let Some(record) = tasks.get_mut(&id) {
            record.state = TaskState::Running;
        }
    }

    async fn finish(&self, id: Uuid, outcome: Result<serde_json::Value, String>) {
        let mut tasks = self.tasks.write().await;
        if let Some(record) = tasks.get_mut(&id) {
            record.finished_at = Some(Instant::now());
            match outcome {
                Ok(result) => {
                    record.state = TaskState::Complete;
                    record.result = Some(result);
                }
                Err(error) => {
                    record.state = TaskState::Failed;
                    record.error = Some(error);
                }
            }
        }
    }

    /// Drop finished records older than the retention window.
    async fn prune(&self) {
        let now = Instant::now();
        let mut tasks = self.tasks.write().await;
        tasks.retain(|id, record| match record.finished_at {
            Some(finished) if now.duration_since(finished) >= self.retention => {
                tracing::debug!(task_id = %id, op = record.op, "Expired task record");
                false
            }
            _ => true,
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    async fn wait_for_finish(registry: &Arc<TaskRegistry>, id: &str) -> TaskStatus {
        for _ in 0..100 {
            let status = registry.status(id).await.unwrap();
            if !matches!(status.state, TaskState::Pending | TaskState::Running) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} never finished");
    }

    #[tokio::test]
    async fn successful_task_records_result() {
        let registry = Arc::new(TaskRegistry::new(Duration::from_secs(60)));

        let id = registry
            .spawn("test", async {
                Ok::<_, std::io::Error>(serde_json::json!({"answer": 42}))
            })
            .await;

        // The record is pollable as soon as spawn returns.
        assert!(registry.status(&id).await.is_some());

        let status = wait_for_finish(&registry, &id).await;
        assert_eq!(status.state, TaskState::Complete);
        assert_eq!(status.result, Some(serde_json::json!({"answer": 42})));
        assert_eq!(status.error, None);
    }

    #[tokio::test]
    async fn failed_task_records_error_message() {
        let registry = Arc::new(TaskRegistry::new(Duration::from_secs(60)));

        let id = registry
            .spawn("test", async {
                Err::<serde_json::Value, _>(std::io::Error::other("backend exploded"))
            })
            .await;

        let status = wait_for_finish(&registry, &id).await;
        assert_eq!(status.state, TaskState::Failed);
        assert_eq!(status.result, None);
        assert_eq!(status.error, Some("backend exploded".to_string()));
    }

    #[tokio::test]
    async fn task_blocks_until_released() {
        let registry = Arc::new(TaskRegistry::new(Duration::from_secs(60)));
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let id = registry
            .spawn("test", async move {
                rx.await.ok();
                Ok::<_, std::io::Error>(serde_json::Value::Null)
            })
            .await;

        let status = registry.status(&id).await.unwrap();
        assert!(matches!(
            status.state,
            TaskState::Pending | TaskState::Running
        ));

        tx.send(()).unwrap();
        let status = wait_for_finish(&registry, &id).await;
        assert_eq!(status.state, TaskState::Complete);
    }

    #[tokio::test]
    async fn finished_tasks_expire_after_retention() {
        let registry = Arc::new(TaskRegistry::new(Duration::from_millis(50)));

        let id = registry
            .spawn("test", async {
                Ok::<_, std::io::Error>(serde_json::Value::Null)
            })
            .await;

        wait_for_finish(&registry, &id).await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(registry.status(&id).await.is_none());
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_none() {
        let registry = Arc::new(TaskRegistry::new(Duration::from_secs(60)));

        let unknown = Uuid::new_v4().to_string();
        assert!(registry.status(&unknown).await.is_none());
        assert!(registry.status("not-a-uuid").await.is_none());
    }
}
