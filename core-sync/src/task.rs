//! # Task and Result Primitives
//!
//! A [`Task`] is a deferred unit of work: a boxed closure that, given a
//! [`TaskContext`], produces a future resolving to a success description or a
//! [`SyncError`]. Invoking a task always yields a [`TaskResult`] carrying the
//! outcome and its start/end timestamps; errors are captured as text and never
//! bubble out of [`Task::invoke`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::task::{Task, TaskContext, TaskKind};
//!
//! let task = Task::new(TaskKind::Media, "2024/a.jpg", |ctx| async move {
//!     if ctx.is_cancelled() {
//!         return Err(SyncError::Cancelled);
//!     }
//!     Ok("created".to_string())
//! });
//!
//! let result = task.invoke(ctx).await;
//! assert!(result.is_success());
//! ```

use crate::job::JobId;
use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// What a task operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Ensure the album for a folder exists
    Album,
    /// Ingest a single media file
    Media,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Album => "album",
            TaskKind::Media => "media",
        }
    }
}

impl FromStr for TaskKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "album" => Ok(TaskKind::Album),
            "media" => Ok(TaskKind::Media),
            _ => Err(SyncError::InvalidStatus(format!("unknown task kind: {}", s))),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tagged outcome of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum TaskOutcome {
    Ok(String),
    Err(String),
}

impl TaskOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, TaskOutcome::Ok(_))
    }

    pub fn message(&self) -> &str {
        match self {
            TaskOutcome::Ok(message) | TaskOutcome::Err(message) => message,
        }
    }
}

impl From<Result<String>> for TaskOutcome {
    fn from(result: Result<String>) -> Self {
        match result {
            Ok(value) => TaskOutcome::Ok(value),
            Err(err) => TaskOutcome::Err(err.to_string()),
        }
    }
}

/// Audit record for one executed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Folder or file path the task worked on
    pub item: String,
    pub kind: TaskKind,
    pub outcome: TaskOutcome,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl TaskResult {
    /// Build a result; `completed_at` is clamped so it never precedes `started_at`.
    pub fn new(
        item: impl Into<String>,
        kind: TaskKind,
        outcome: TaskOutcome,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let completed_at = completed_at.max(started_at);
        Self {
            item: item.into(),
            kind,
            outcome,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Execution context handed to every task
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub job_id: JobId,
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(job_id: JobId, cancel: CancellationToken) -> Self {
        Self { job_id, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

type TaskFn = Box<dyn FnOnce(TaskContext) -> BoxFuture<'static, Result<String>> + Send>;

/// A deferred, single-shot unit of work
pub struct Task {
    kind: TaskKind,
    item: String,
    run: TaskFn,
}

impl Task {
    pub fn new<F, Fut>(kind: TaskKind, item: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            kind,
            item: item.into(),
            run: Box::new(move |ctx| f(ctx).boxed()),
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn item(&self) -> &str {
        &self.item
    }

    /// Run the task to completion and record the outcome.
    pub async fn invoke(self, ctx: TaskContext) -> TaskResult {
        let started_at = Utc::now();
        let result = (self.run)(ctx).await;
        TaskResult::new(self.item, self.kind, result.into(), started_at, Utc::now())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind)
            .field("item", &self.item)
            .finish()
    }
}
