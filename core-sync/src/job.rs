//! # Sync Job State Machine
//!
//! A [`Job`] owns the ordered task list for one folder, a progress meter and a
//! control plane for pause, resume and stop.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!    │        ↕  │ ↘
//!    │      Paused│  Failed
//!    │        ↓  ↓
//!    │      Stopping → Stopped
//!    └──────────────→ Stopped
//! ```
//!
//! Tasks are drained strictly in order. Control signals are only observed
//! between tasks: a running task is never interrupted. A failing task is
//! recorded and the loop moves on; only a crashed loop (a panicking task)
//! ends in `Failed`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::job::{Job, JobStatus};
//! use tokio_util::sync::CancellationToken;
//!
//! let job = Arc::new(Job::new("2024", tasks));
//! let runner = Arc::clone(&job);
//! tokio::spawn(async move { runner.start(CancellationToken::new()).await });
//!
//! job.pause();
//! job.resume();
//! job.stop().await;
//! assert_eq!(job.snapshot().status, JobStatus::Stopped);
//! ```

use crate::task::{Task, TaskContext, TaskOutcome, TaskResult};
use crate::{Result, SyncError};
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Option key holding the folder a job was generated for.
pub const PATH_OPTION: &str = "path";

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| SyncError::InvalidJobId(e.to_string()))?,
        ))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Registered, waiting for admission
    Pending,
    /// Draining its task queue
    Running,
    /// Blocked between tasks until resumed
    Paused,
    /// Stop requested, waiting for the loop to acknowledge
    Stopping,
    /// Every task produced a result
    Completed,
    /// The task loop crashed
    Failed,
    /// Stopped by request or cancelled
    Stopped,
}

impl JobStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped
        )
    }

    /// Statuses that occupy a concurrency slot in the scheduler
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Paused | JobStatus::Stopping
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Stopping => "stopping",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }
}

impl FromStr for JobStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "stopping" => Ok(JobStatus::Stopping),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "stopped" => Ok(JobStatus::Stopped),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signal sent from control methods to the task loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlSignal {
    Run,
    Pause,
    Stop,
}

/// What the loop should do after a checkpoint
enum Checkpoint {
    Continue,
    Stop,
    Cancelled,
}

// ============================================================================
// Progress Types
// ============================================================================

#[derive(Debug)]
struct JobProgress {
    status: JobStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    remaining: usize,
    results: Vec<TaskResult>,
    reason: Option<String>,
}

/// Point-in-time copy of a job's progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    /// Folder the job was generated for, relative to the data root
    pub path: String,
    pub status: JobStatus,
    pub total: usize,
    pub remaining: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub options: HashMap<String, String>,
    /// Per-task results in execution order
    pub results: Vec<TaskResult>,
}

impl JobSnapshot {
    /// Number of results carrying an error
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// Percentage of tasks that have produced a result
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let done = self.total.saturating_sub(self.remaining);
        ((done * 100) / self.total).min(100) as u8
    }
}

// ============================================================================
// Sync Job Entity
// ============================================================================

/// One schedulable unit of sync work, scoped to a single folder
pub struct Job {
    id: JobId,
    path: String,
    options: HashMap<String, String>,
    total: usize,
    tasks: Mutex<VecDeque<Task>>,
    progress: Mutex<JobProgress>,
    control: watch::Sender<ControlSignal>,
    finished: watch::Sender<bool>,
    event_bus: Option<EventBus>,
}

impl Job {
    /// Create a pending job for `path` owning `tasks`
    pub fn new(path: impl Into<String>, tasks: Vec<Task>) -> Self {
        let path = path.into();
        let total = tasks.len();
        let mut options = HashMap::new();
        options.insert(PATH_OPTION.to_string(), path.clone());

        Self {
            id: JobId::new(),
            path,
            options,
            total,
            tasks: Mutex::new(tasks.into()),
            progress: Mutex::new(JobProgress {
                status: JobStatus::Pending,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                remaining: total,
                results: Vec::with_capacity(total),
                reason: None,
            }),
            control: watch::channel(ControlSignal::Run).0,
            finished: watch::channel(false).0,
            event_bus: None,
        }
    }

    /// Attach a display/filter option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Publish lifecycle events on `event_bus`
    pub fn with_events(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn options(&self) -> &HashMap<String, String> {
        &self.options
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn status(&self) -> JobStatus {
        self.progress().status
    }

    /// Completion time, set once the job is terminal
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.progress().completed_at
    }

    /// Copy every progress field under the lock
    pub fn snapshot(&self) -> JobSnapshot {
        let progress = self.progress();
        JobSnapshot {
            id: self.id,
            path: self.path.clone(),
            status: progress.status,
            total: self.total,
            remaining: progress.remaining,
            created_at: progress.created_at,
            started_at: progress.started_at,
            completed_at: progress.completed_at,
            reason: progress.reason.clone(),
            options: self.options.clone(),
            results: progress.results.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Transition `Pending → Running` without executing anything.
    ///
    /// The scheduler calls this under its queue lock so that admission
    /// counting sees the new status before the loop is spawned.
    pub fn begin(&self) -> Result<()> {
        {
            let mut progress = self.progress();
            if progress.status != JobStatus::Pending {
                return Err(SyncError::InvalidStateTransition {
                    from: progress.status.to_string(),
                    to: JobStatus::Running.to_string(),
                    reason: "job can only start from pending".to_string(),
                });
            }
            progress.status = JobStatus::Running;
            progress.started_at = Some(Utc::now());
        }

        info!(job_id = %self.id, path = %self.path, total = self.total, "Job started");
        self.emit(SyncEvent::JobStarted {
            job_id: self.id.to_string(),
            path: self.path.clone(),
            total: self.total,
        });
        Ok(())
    }

    /// Begin and drain the queue.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        self.begin()?;
        self.run(cancel).await
    }

    /// Drain the task queue of a job already moved out of `Pending`.
    ///
    /// Returns `Ok(())` when the queue is exhausted or a stop request is
    /// honoured, `Err(Cancelled)` if `cancel` fires, and `Err(Task)` if a
    /// task panics.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        {
            let progress = self.progress();
            if !progress.status.is_active() {
                return Err(SyncError::InvalidStateTransition {
                    from: progress.status.to_string(),
                    to: JobStatus::Running.to_string(),
                    reason: "job loop requires a started job".to_string(),
                });
            }
        }

        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        let mut control = self.control.subscribe();

        loop {
            match self.checkpoint(&cancel, &mut control).await {
                Checkpoint::Continue => {}
                Checkpoint::Stop => {
                    self.finish(JobStatus::Stopped, Some("stop requested".to_string()));
                    return Ok(());
                }
                Checkpoint::Cancelled => {
                    self.finish(JobStatus::Stopped, Some("cancelled".to_string()));
                    return Err(SyncError::Cancelled);
                }
            }

            let Some(task) = tasks.pop_front() else {
                break;
            };

            let kind = task.kind();
            let item = task.item().to_string();
            let started_at = Utc::now();
            let ctx = TaskContext::new(self.id, cancel.clone());

            match AssertUnwindSafe(task.invoke(ctx)).catch_unwind().await {
                Ok(result) => self.record(result),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(job_id = %self.id, item = %item, error = %message, "Task panicked");
                    self.record(TaskResult::new(
                        item,
                        kind,
                        TaskOutcome::Err(format!("task panicked: {}", message)),
                        started_at,
                        Utc::now(),
                    ));
                    self.finish(
                        JobStatus::Failed,
                        Some(format!("task loop crashed: {}", message)),
                    );
                    return Err(SyncError::Task(message));
                }
            }
        }

        let stopping = self.status() == JobStatus::Stopping;
        if stopping {
            self.finish(JobStatus::Stopped, Some("stop requested".to_string()));
        } else {
            self.finish(JobStatus::Completed, None);
        }
        Ok(())
    }

    async fn checkpoint(
        &self,
        cancel: &CancellationToken,
        control: &mut watch::Receiver<ControlSignal>,
    ) -> Checkpoint {
        let mut waiting = false;
        loop {
            if cancel.is_cancelled() {
                return Checkpoint::Cancelled;
            }

            let signal = *control.borrow_and_update();
            match signal {
                ControlSignal::Run => {
                    if waiting {
                        debug!(job_id = %self.id, "Task loop resumed");
                    }
                    return Checkpoint::Continue;
                }
                ControlSignal::Stop => return Checkpoint::Stop,
                ControlSignal::Pause => {
                    if !waiting {
                        debug!(job_id = %self.id, "Task loop waiting for resume");
                        waiting = true;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        changed = control.changed() => {
                            if changed.is_err() {
                                return Checkpoint::Stop;
                            }
                        }
                    }
                }
            }
        }
    }

    fn record(&self, result: TaskResult) {
        let success = result.is_success();
        let remaining = {
            let mut progress = self.progress();
            progress.remaining = progress.remaining.saturating_sub(1);
            progress.results.push(result.clone());
            progress.remaining
        };

        if success {
            debug!(
                job_id = %self.id,
                task = %result.kind,
                item = %result.item,
                remaining,
                "Task finished"
            );
        } else {
            warn!(
                job_id = %self.id,
                task = %result.kind,
                item = %result.item,
                error = %result.outcome.message(),
                remaining,
                "Task failed"
            );
        }

        self.emit(SyncEvent::TaskFinished {
            job_id: self.id.to_string(),
            item: result.item,
            kind: result.kind.to_string(),
            success,
            remaining,
        });
    }

    /// Enter a terminal status unless one was already reached, then release
    /// anyone waiting on the loop.
    fn finish(&self, status: JobStatus, reason: Option<String>) {
        let applied = {
            let mut progress = self.progress();
            if progress.status.is_terminal() {
                None
            } else {
                progress.status = status;
                progress.completed_at = Some(Utc::now());
                if reason.is_some() {
                    progress.reason = reason.clone();
                }
                // Releases a loop parked on pause when the job is ended from outside
                self.control.send_replace(ControlSignal::Stop);
                Some(progress.results.iter().filter(|r| !r.is_success()).count())
            }
        };
        self.finished.send_replace(true);

        let Some(failed) = applied else {
            return;
        };

        let job_id = self.id.to_string();
        match status {
            JobStatus::Completed => {
                info!(job_id = %self.id, total = self.total, failed, "Job completed");
                self.emit(SyncEvent::JobCompleted {
                    job_id,
                    total: self.total,
                    failed,
                });
            }
            JobStatus::Failed => {
                let reason = reason.unwrap_or_default();
                error!(job_id = %self.id, reason = %reason, "Job failed");
                self.emit(SyncEvent::JobFailed { job_id, reason });
            }
            _ => {
                info!(job_id = %self.id, reason = ?reason, "Job stopped");
                self.emit(SyncEvent::JobStopped { job_id, reason });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------------

    /// Pause a running job at the next task boundary. No-op otherwise.
    pub fn pause(&self) {
        {
            let mut progress = self.progress();
            if progress.status != JobStatus::Running {
                return;
            }
            progress.status = JobStatus::Paused;
            // Signal under the lock so a concurrent stop() cannot be overwritten
            self.control.send_replace(ControlSignal::Pause);
        }
        info!(job_id = %self.id, "Job paused");
        self.emit(SyncEvent::JobPaused {
            job_id: self.id.to_string(),
        });
    }

    /// Resume a paused job. No-op otherwise.
    pub fn resume(&self) {
        {
            let mut progress = self.progress();
            if progress.status != JobStatus::Paused {
                return;
            }
            progress.status = JobStatus::Running;
            self.control.send_replace(ControlSignal::Run);
        }
        info!(job_id = %self.id, "Job resumed");
        self.emit(SyncEvent::JobResumed {
            job_id: self.id.to_string(),
        });
    }

    /// Pause if running, resume if paused.
    pub fn toggle_pause(&self) {
        match self.status() {
            JobStatus::Running => self.pause(),
            JobStatus::Paused => self.resume(),
            _ => {}
        }
    }

    /// Stop the job and wait until its loop has acknowledged.
    ///
    /// A pending job is stopped immediately; a terminal job is left as is.
    pub async fn stop(&self) {
        let previous = {
            let mut progress = self.progress();
            let previous = progress.status;
            match previous {
                JobStatus::Pending => {
                    progress.status = JobStatus::Stopped;
                    progress.completed_at = Some(Utc::now());
                    progress.reason = Some("stopped before start".to_string());
                }
                JobStatus::Running | JobStatus::Paused => {
                    progress.status = JobStatus::Stopping;
                    self.control.send_replace(ControlSignal::Stop);
                }
                JobStatus::Stopping => {
                    self.control.send_replace(ControlSignal::Stop);
                }
                _ => {}
            }
            previous
        };

        match previous {
            JobStatus::Pending => {
                self.finished.send_replace(true);
                info!(job_id = %self.id, "Job stopped before start");
                self.emit(SyncEvent::JobStopped {
                    job_id: self.id.to_string(),
                    reason: Some("stopped before start".to_string()),
                });
            }
            JobStatus::Running | JobStatus::Paused | JobStatus::Stopping => {
                debug!(job_id = %self.id, "Waiting for job loop to stop");
                self.wait_finished().await;
            }
            _ => {}
        }
    }

    /// Mark the job failed with `reason`.
    ///
    /// A running loop exits at its next task boundary. A terminal job is left as is.
    pub fn fail(&self, reason: impl Into<String>) {
        self.finish(JobStatus::Failed, Some(reason.into()));
    }

    /// Resolve once the job loop has exited or the job reached a terminal state.
    pub async fn wait_finished(&self) {
        let mut finished = self.finished.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = finished.wait_for(|done| *done).await;
    }

    fn progress(&self) -> MutexGuard<'_, JobProgress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Sync(event));
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("status", &self.status())
            .field("total", &self.total)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn ok_task(item: &str) -> Task {
        let name = item.to_string();
        Task::new(TaskKind::Media, item, move |_| async move { Ok(format!("created {}", name)) })
    }

    fn err_task(item: &str) -> Task {
        Task::new(TaskKind::Media, item, |_| async {
            Err(SyncError::Task("write failed".to_string()))
        })
    }

    /// A task that signals when it starts and blocks until released
    fn gated_task(item: &str, started: Arc<Notify>, release: Arc<Notify>) -> Task {
        Task::new(TaskKind::Media, item, move |_| async move {
            started.notify_one();
            release.notified().await;
            Ok("done".to_string())
        })
    }

    #[test]
    fn test_job_id_round_trip() {
        let id = JobId::new();
        let parsed = JobId::from_string(&id.as_str()).unwrap();
        assert_eq!(id, parsed);
        assert!(matches!(
            JobId::from_string("not-a-uuid"),
            Err(SyncError::InvalidJobId(_))
        ));
    }

    #[test]
    fn test_status_helpers() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Stopping.is_terminal());

        assert!(JobStatus::Paused.is_active());
        assert!(JobStatus::Stopping.is_active());
        assert!(!JobStatus::Pending.is_active());

        assert_eq!("Paused".parse::<JobStatus>().unwrap(), JobStatus::Paused);
        assert!("bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new("2024", vec![ok_task("a"), ok_task("b")]).with_option("batch", "b1");
        let snapshot = job.snapshot();

        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.remaining, 2);
        assert!(snapshot.results.is_empty());
        assert!(snapshot.started_at.is_none());
        assert_eq!(snapshot.options.get(PATH_OPTION), Some(&"2024".to_string()));
        assert_eq!(snapshot.options.get("batch"), Some(&"b1".to_string()));
        assert_eq!(snapshot.percent(), 0);
    }

    #[tokio::test]
    async fn test_run_to_completion_records_failures_and_continues() {
        let job = Job::new("2024", vec![ok_task("a"), err_task("b"), ok_task("c")]);

        job.start(CancellationToken::new()).await.unwrap();

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.remaining, 0);
        assert_eq!(snapshot.results.len(), 3);
        assert_eq!(snapshot.failed_count(), 1);
        assert!(snapshot.reason.is_none());
        assert!(snapshot.completed_at.is_some());

        let items: Vec<_> = snapshot.results.iter().map(|r| r.item.as_str()).collect();
        assert_eq!(items, vec!["a", "b", "c"]);
        for result in &snapshot.results {
            assert!(result.started_at <= result.completed_at);
        }
    }

    #[tokio::test]
    async fn test_empty_job_completes_immediately() {
        let job = Job::new("", Vec::new());
        job.start(CancellationToken::new()).await.unwrap();

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Completed);
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.percent(), 100);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let job = Job::new("2024", vec![ok_task("a")]);
        job.start(CancellationToken::new()).await.unwrap();

        let second = job.start(CancellationToken::new()).await;
        assert!(matches!(
            second,
            Err(SyncError::InvalidStateTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_without_begin_is_rejected() {
        let job = Job::new("2024", vec![ok_task("a")]);
        assert!(job.run(CancellationToken::new()).await.is_err());
        assert_eq!(job.status(), JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_pause_and_resume_between_tasks() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let job = Arc::new(Job::new(
            "2024",
            vec![
                gated_task("a", started.clone(), release.clone()),
                ok_task("b"),
            ],
        ));

        let runner = Arc::clone(&job);
        let handle = tokio::spawn(async move { runner.start(CancellationToken::new()).await });

        started.notified().await;
        job.pause();
        assert_eq!(job.status(), JobStatus::Paused);

        release.notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // First task finished, second is held back by the pause
        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Paused);
        assert_eq!(snapshot.results.len(), 1);
        assert_eq!(snapshot.remaining, 1);

        job.toggle_pause();
        handle.await.unwrap().unwrap();

        assert_eq!(job.status(), JobStatus::Completed);
        assert_eq!(job.snapshot().results.len(), 2);
    }

    #[tokio::test]
    async fn test_pause_is_noop_unless_running() {
        let job = Job::new("2024", vec![ok_task("a")]);
        job.pause();
        assert_eq!(job.status(), JobStatus::Pending);

        job.start(CancellationToken::new()).await.unwrap();
        job.pause();
        job.resume();
        assert_eq!(job.status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_stop_running_job_keeps_counts_consistent() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let job = Arc::new(Job::new(
            "2024",
            vec![
                gated_task("a", started.clone(), release.clone()),
                ok_task("b"),
                ok_task("c"),
            ],
        ));

        let runner = Arc::clone(&job);
        let handle = tokio::spawn(async move { runner.start(CancellationToken::new()).await });
        started.notified().await;

        let stopper = Arc::clone(&job);
        let stop = tokio::spawn(async move { stopper.stop().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(job.status(), JobStatus::Stopping);

        release.notify_one();
        stop.await.unwrap();
        handle.await.unwrap().unwrap();

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Stopped);
        assert_eq!(snapshot.results.len(), 1);
        assert_eq!(snapshot.remaining + snapshot.results.len(), snapshot.total);
        assert_eq!(snapshot.reason.as_deref(), Some("stop requested"));
    }

    #[tokio::test]
    async fn test_stop_paused_job() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let job = Arc::new(Job::new(
            "2024",
            vec![gated_task("a", started.clone(), release.clone()), ok_task("b")],
        ));

        let runner = Arc::clone(&job);
        let handle = tokio::spawn(async move { runner.start(CancellationToken::new()).await });
        started.notified().await;
        job.pause();
        release.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;

        job.stop().await;
        handle.await.unwrap().unwrap();

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Stopped);
        assert_eq!(snapshot.remaining, 1);
    }

    #[tokio::test]
    async fn test_stop_pending_and_terminal_jobs() {
        let pending = Job::new("2024", vec![ok_task("a")]);
        pending.stop().await;
        let snapshot = pending.snapshot();
        assert_eq!(snapshot.status, JobStatus::Stopped);
        assert_eq!(snapshot.remaining, 1);
        assert!(snapshot.completed_at.is_some());

        let done = Job::new("2024", vec![ok_task("a")]);
        done.start(CancellationToken::new()).await.unwrap();
        done.stop().await;
        assert_eq!(done.status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_external_cancellation_wins() {
        let cancel = CancellationToken::new();
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let job = Arc::new(Job::new(
            "2024",
            vec![gated_task("a", started.clone(), release.clone()), ok_task("b")],
        ));

        let runner = Arc::clone(&job);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { runner.start(token).await });
        started.notified().await;

        job.pause();
        cancel.cancel();
        release.notify_one();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(SyncError::Cancelled)));

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Stopped);
        assert_eq!(snapshot.reason.as_deref(), Some("cancelled"));
        assert_eq!(snapshot.remaining + snapshot.results.len(), snapshot.total);
    }

    #[tokio::test]
    async fn test_panicking_task_fails_job() {
        let panicking = Task::new(TaskKind::Album, "2024", |_| async {
            if true {
                panic!("catalog exploded");
            }
            Ok(String::new())
        });
        let job = Job::new("2024", vec![panicking, ok_task("a")]);

        let result = job.start(CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::Task(_))));

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert!(snapshot
            .reason
            .as_deref()
            .unwrap()
            .contains("catalog exploded"));
        assert_eq!(snapshot.results.len(), 1);
        assert_eq!(snapshot.remaining, 1);
    }

    #[tokio::test]
    async fn test_fail_pending_job() {
        let job = Job::new("2024", vec![ok_task("a")]);
        job.fail("album writer unavailable");

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.reason.as_deref(), Some("album writer unavailable"));
        // Waiters are released immediately
        job.wait_finished().await;
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let job = Job::new("2024", vec![ok_task("a"), err_task("b")]).with_events(bus);

        job.start(CancellationToken::new()).await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.description().to_string());
            if let CoreEvent::Sync(SyncEvent::JobCompleted { total, failed, .. }) = event {
                assert_eq!(total, 2);
                assert_eq!(failed, 1);
            }
        }
        assert_eq!(
            names,
            vec!["Job started", "Task finished", "Task finished", "Job completed"]
        );
    }

    #[test]
    fn test_snapshot_serializes() {
        let job = Job::new("2024", vec![ok_task("a")]);
        let json = serde_json::to_value(job.snapshot()).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["path"], "2024");
        assert_eq!(json["total"], 1);
    }

    fn sleeping_task(item: String) -> Task {
        Task::new(TaskKind::Media, item, |_| async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok("created".to_string())
        })
    }

    #[tokio::test]
    async fn test_late_pause_and_resume_do_not_override_stop() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let job = Arc::new(Job::new(
            "2024",
            vec![
                gated_task("a", started.clone(), release.clone()),
                ok_task("b"),
                ok_task("c"),
            ],
        ));
        job.begin().unwrap();
        let runner = Arc::clone(&job);
        let handle = tokio::spawn(async move { runner.run(CancellationToken::new()).await });
        started.notified().await;

        let stopper = Arc::clone(&job);
        let stopping = tokio::spawn(async move { stopper.stop().await });
        while job.status() != JobStatus::Stopping {
            tokio::task::yield_now().await;
        }

        job.pause();
        job.resume();
        job.toggle_pause();
        assert_eq!(job.status(), JobStatus::Stopping);

        release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), stopping)
            .await
            .expect("stop() did not return")
            .unwrap();
        handle.await.unwrap().unwrap();

        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Stopped);
        assert_eq!(snapshot.results.len(), 1);
        assert_eq!(snapshot.remaining, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pause_resume_and_stop_always_settle() {
        for round in 0..200 {
            let tasks = (0..20).map(|i| sleeping_task(format!("{round}/{i}.jpg"))).collect();
            let job = Arc::new(Job::new("race", tasks));
            job.begin().unwrap();

            let runner = Arc::clone(&job);
            let handle = tokio::spawn(async move { runner.run(CancellationToken::new()).await });

            let toggler = {
                let job = Arc::clone(&job);
                tokio::spawn(async move {
                    for _ in 0..50 {
                        job.pause();
                        tokio::task::yield_now().await;
                        job.resume();
                        tokio::task::yield_now().await;
                    }
                })
            };
            tokio::task::yield_now().await;

            tokio::time::timeout(Duration::from_secs(5), job.stop())
                .await
                .expect("stop() did not return");
            toggler.await.unwrap();
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("job loop did not exit")
                .unwrap()
                .unwrap();

            let snapshot = job.snapshot();
            assert_eq!(snapshot.status, JobStatus::Stopped);
            assert_eq!(snapshot.remaining + snapshot.results.len(), snapshot.total);
            assert!(snapshot.results.len() < snapshot.total);
        }
    }

    #[tokio::test]
    async fn test_fail_releases_paused_loop() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let job = Arc::new(Job::new(
            "2024",
            vec![gated_task("a", started.clone(), release.clone()), ok_task("b")],
        ));
        job.begin().unwrap();
        let runner = Arc::clone(&job);
        let handle = tokio::spawn(async move { runner.run(CancellationToken::new()).await });
        started.notified().await;

        job.pause();
        release.notify_one();
        job.fail("catalog went away");

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("job loop did not exit")
            .unwrap()
            .unwrap();
        let snapshot = job.snapshot();
        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.reason.as_deref(), Some("catalog went away"));
        assert_eq!(snapshot.results.len(), 1);
    }
}
