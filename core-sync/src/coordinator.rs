//! # Sync Coordinator
//!
//! Entry point for folder synchronization.
//!
//! ## Overview
//!
//! The `SyncCoordinator` ties the pieces together:
//! - Validates and normalizes the requested folder path
//! - Runs discovery and job generation through [`JobGenerator`]
//! - Registers the resulting jobs with its own [`Scheduler`]
//! - Answers status queries and forwards control requests to jobs
//! - Emits a `BatchQueued` event per accepted request
//!
//! ## Workflow
//!
//! 1. `start_sync("2024")` discovers the tree below the data root
//! 2. One job per folder is generated, parents before children
//! 3. Jobs are appended to the scheduler queue as one batch
//! 4. The scheduler tick admits them up to the concurrency ceiling
//! 5. Callers poll `get_status` / `list_statuses` or subscribe to events
//!
//! A discovery failure fails `start_sync` before anything is registered.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::SyncCoordinator;
//!
//! let coordinator = SyncCoordinator::new(config, discoverer, albums, media, event_bus);
//! coordinator.start()?;
//!
//! let batch = coordinator.start_sync("2024").await?;
//! for job_id in &batch.job_ids {
//!     let snapshot = coordinator.get_status(*job_id)?;
//!     println!("{}: {}%", snapshot.path, snapshot.percent());
//! }
//!
//! coordinator.shutdown().await;
//! ```

use crate::{
    generator::JobGenerator,
    job::{JobId, JobSnapshot, JobStatus},
    scheduler::Scheduler,
    Result, SyncError,
};
use bridge_traits::{
    catalog::{AlbumWriter, MediaWriter},
    discovery::TreeDiscoverer,
};
use core_runtime::config::SchedulerConfig;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Option key tying a job to the `start_sync` call that produced it.
pub const BATCH_ID_OPTION: &str = "batch_id";

/// Handle returned by [`SyncCoordinator::start_sync`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatch {
    pub batch_id: String,
    /// Normalized folder path the batch was generated for
    pub path: String,
    /// Registered jobs in generation order
    pub job_ids: Vec<JobId>,
}

impl SyncBatch {
    pub fn len(&self) -> usize {
        self.job_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.job_ids.is_empty()
    }
}

/// Sync service façade over the generator and scheduler
pub struct SyncCoordinator {
    scheduler: Arc<Scheduler>,
    generator: JobGenerator,
    event_bus: EventBus,
}

impl SyncCoordinator {
    /// Create a coordinator with its own scheduler.
    ///
    /// The scheduler ticker is not running until [`SyncCoordinator::start`].
    pub fn new(
        config: SchedulerConfig,
        discoverer: Arc<dyn TreeDiscoverer>,
        albums: Arc<dyn AlbumWriter>,
        media: Arc<dyn MediaWriter>,
        event_bus: EventBus,
    ) -> Self {
        let scheduler = Scheduler::new(config).with_events(event_bus.clone());
        Self::from_parts(
            scheduler,
            JobGenerator::new(discoverer, albums, media),
            event_bus,
        )
    }

    /// Assemble a coordinator from a pre-configured scheduler (custom clock etc.)
    pub fn from_parts(scheduler: Scheduler, generator: JobGenerator, event_bus: EventBus) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
            generator,
            event_bus,
        }
    }

    /// Start the scheduler's periodic tick
    pub fn start(&self) -> Result<()> {
        self.scheduler.start()
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Discover `path`, generate one job per folder and register them.
    ///
    /// `path` is relative to the data root; `""` means the whole library.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidPath`] for absolute paths or `..` components
    /// - [`SyncError::Discovery`] when the tree cannot be discovered
    /// - [`SyncError::SchedulerStopped`] after [`SyncCoordinator::shutdown`]
    #[instrument(skip(self))]
    pub async fn start_sync(&self, path: &str) -> Result<SyncBatch> {
        if self.scheduler.is_stopped() {
            return Err(SyncError::SchedulerStopped);
        }

        let path = normalize_path(path)?;
        let jobs = self.generator.generate(&path).await?;

        let batch_id = Uuid::new_v4().to_string();
        let jobs = jobs
            .into_iter()
            .map(|job| {
                job.with_option(BATCH_ID_OPTION, batch_id.clone())
                    .with_events(self.event_bus.clone())
            })
            .collect();
        let registered = self.scheduler.add_all(jobs)?;

        let batch = SyncBatch {
            batch_id,
            path,
            job_ids: registered.iter().map(|job| job.id()).collect(),
        };

        info!(
            batch_id = %batch.batch_id,
            path = %batch.path,
            jobs = batch.len(),
            "Sync batch queued"
        );
        let _ = self.event_bus.emit(CoreEvent::Sync(SyncEvent::BatchQueued {
            batch_id: batch.batch_id.clone(),
            path: batch.path.clone(),
            job_count: batch.len(),
        }));

        Ok(batch)
    }

    /// Snapshot of one job.
    pub fn get_status(&self, job_id: JobId) -> Result<JobSnapshot> {
        self.scheduler
            .get(job_id)
            .map(|job| job.snapshot())
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Snapshots of every registered job, optionally filtered by status.
    pub fn list_statuses(&self, filter: Option<JobStatus>) -> Vec<JobSnapshot> {
        let jobs = match filter {
            Some(status) => self.scheduler.get_by_status(status),
            None => self.scheduler.get_all(),
        };
        jobs.iter().map(|job| job.snapshot()).collect()
    }

    /// Snapshots of the jobs created by one `start_sync` call
    pub fn batch_statuses(&self, batch_id: &str) -> Vec<JobSnapshot> {
        self.scheduler
            .get_all()
            .iter()
            .filter(|job| {
                job.options()
                    .get(BATCH_ID_OPTION)
                    .is_some_and(|id| id == batch_id)
            })
            .map(|job| job.snapshot())
            .collect()
    }

    /// Pause a running job. A job that is not running is left untouched.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn pause(&self, job_id: JobId) -> Result<()> {
        self.find(job_id)?.pause();
        Ok(())
    }

    /// Resume a paused job. A job that is not paused is left untouched.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn resume(&self, job_id: JobId) -> Result<()> {
        self.find(job_id)?.resume();
        Ok(())
    }

    /// Stop one job and wait until its loop has acknowledged.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn stop(&self, job_id: JobId) -> Result<()> {
        self.scheduler.stop_job(job_id).await
    }

    /// Stop every pending and active job.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) -> Result<()> {
        self.scheduler.stop_all().await;
        Ok(())
    }

    /// Drop every finished job from the registry. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        self.scheduler.clear_finished()
    }

    /// Stop active jobs and the scheduler ticker. Blocks until both are done.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        info!("Sync coordinator shut down");
    }

    /// Whether a job for the album at `path` is currently running.
    pub fn is_path_syncing(&self, path: &str) -> bool {
        let Ok(path) = normalize_path(path) else {
            return false;
        };
        let syncing = self
            .scheduler
            .get_by_status(JobStatus::Running)
            .iter()
            .any(|job| job.path() == path);
        debug!(path = %path, syncing, "Checked path sync state");
        syncing
    }

    fn find(&self, job_id: JobId) -> Result<Arc<crate::job::Job>> {
        self.scheduler
            .get(job_id)
            .ok_or_else(|| SyncError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }
}

/// Normalize a data-root-relative folder path.
///
/// Backslashes become `/`, empty and `.` segments are dropped. Absolute paths
/// and `..` segments are rejected.
pub fn normalize_path(path: &str) -> Result<String> {
    let path = path.trim().replace('\\', "/");
    if path.starts_with('/') || has_drive_prefix(&path) {
        return Err(SyncError::InvalidPath(format!(
            "path must be relative to the data root: {}",
            path
        )));
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(SyncError::InvalidPath(format!(
                    "path must not leave the data root: {}",
                    path
                )))
            }
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

/// `C:` or `C:/...`, but not a folder name such as `x:raw`
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("").unwrap(), "");
        assert_eq!(normalize_path("  2024/ ").unwrap(), "2024");
        assert_eq!(normalize_path("./2024//summer/").unwrap(), "2024/summer");
        assert_eq!(normalize_path("2024\\summer").unwrap(), "2024/summer");
    }

    #[test]
    fn test_normalize_rejects_escapes() {
        assert!(matches!(
            normalize_path("/etc"),
            Err(SyncError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize_path("2024/../../etc"),
            Err(SyncError::InvalidPath(_))
        ));
        assert!(matches!(
            normalize_path("C:\\photos"),
            Err(SyncError::InvalidPath(_))
        ));
        assert!(matches!(normalize_path("d:"), Err(SyncError::InvalidPath(_))));
    }

    #[test]
    fn test_normalize_keeps_colon_folder_names() {
        assert_eq!(normalize_path("x:raw").unwrap(), "x:raw");
        assert_eq!(normalize_path("2024/x:raw").unwrap(), "2024/x:raw");
        assert_eq!(normalize_path("1:/shots").unwrap(), "1:/shots");
    }

    #[test]
    fn test_batch_len() {
        let batch = SyncBatch {
            batch_id: "b".to_string(),
            path: String::new(),
            job_ids: vec![JobId::new(), JobId::new()],
        };
        assert_eq!(batch.len(), 2);
        assert!(!batch.is_empty());
    }
}
