// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::types::TaskKind;

/// Progress and completion notifications emitted by the task queue worker.
/// This is the whole surface the presentation layer may depend on for
/// long-running operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Counters for UI feedback; `done` increments once per completed leaf
    /// file, not per byte.
    Progress { done: usize, total: usize },
    /// Human-readable status line, e.g. "uploading /home/alice/farm/a.exr".
    Text(String),
    /// Terminal state of one task.
    Completed {
        kind: TaskKind,
        success: bool,
        message: String,
    },
    /// Failure detail for a task that ended unsuccessfully.
    Error(String),
}

/// Event sink for task progress. Held as `Arc<dyn TaskSink>` by the queue
/// worker task.
#[async_trait]
pub trait TaskSink: Send + Sync {
    async fn send(&self, event: TaskEvent);
}

/// Sink that discards everything; for callers that only care about terminal
/// outcomes via blocking enqueue.
pub struct NoopSink;

#[async_trait]
impl TaskSink for NoopSink {
    async fn send(&self, _event: TaskEvent) {}
}
