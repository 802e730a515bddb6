// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-worker FIFO of background tells.
//!
//! Fire-and-forget requests land here with a task id the caller can log
//! against. One worker drains the queue in order and runs each tell
//! through the same path as a synchronous request; failures are logged
//! and discarded.

use iris_core::IrisError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Soft bound on queued tasks before enqueue starts failing.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One queued background tell.
#[derive(Debug, Clone)]
pub struct QueuedTell {
    pub task_id: String,
    pub from_team: String,
    pub to_team: String,
    pub content: String,
    pub timeout_ms: i64,
}

pub struct AsyncQueue {
    tx: mpsc::Sender<QueuedTell>,
    capacity: usize,
    next_id: AtomicU64,
    worker: tokio::task::JoinHandle<()>,
}

impl AsyncQueue {
    /// Start the worker. `handler` runs one tell to completion and returns
    /// the reply text.
    pub fn new<F, Fut>(capacity: usize, handler: F) -> Self
    where
        F: Fn(QueuedTell) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, IrisError>> + Send,
    {
        let (tx, mut rx) = mpsc::channel::<QueuedTell>(capacity);
        let worker = tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let task_id = task.task_id.clone();
                tracing::info!(
                    task_id,
                    from_team = task.from_team,
                    to_team = task.to_team,
                    "processing queued tell"
                );
                match handler(task).await {
                    Ok(reply) => {
                        tracing::info!(task_id, reply_len = reply.len(), "queued tell complete")
                    }
                    Err(e) => tracing::warn!(task_id, error = %e, "queued tell failed"),
                }
            }
        });
        Self { tx, capacity, next_id: AtomicU64::new(0), worker }
    }

    /// Enqueue a tell, returning its task id. Fails fast when the queue is
    /// at its soft bound.
    pub fn enqueue(
        &self,
        from_team: &str,
        to_team: &str,
        content: &str,
        timeout_ms: i64,
    ) -> Result<String, IrisError> {
        let task_id = format!("task-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let task = QueuedTell {
            task_id: task_id.clone(),
            from_team: from_team.to_string(),
            to_team: to_team.to_string(),
            content: content.to_string(),
            timeout_ms,
        };
        match self.tx.try_send(task) {
            Ok(()) => Ok(task_id),
            Err(mpsc::error::TrySendError::Full(_)) => Err(IrisError::QueueFull(self.capacity)),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(IrisError::Transport("task queue worker is gone".to_string()))
            }
        }
    }

    /// Stop the worker. Tasks still queued are dropped; the in-flight one
    /// is cancelled at its next suspension point.
    pub fn shutdown(&self) {
        self.worker.abort();
    }
}

impl Drop for AsyncQueue {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
