//! # Sync & Indexing Module
//!
//! Keeps the photo catalog in step with the folder tree on disk.
//!
//! ## Overview
//!
//! This module manages the lifecycle of sync jobs, including:
//! - Turning a discovered folder tree into one job per folder
//! - Running each job's album and media tasks strictly in order
//! - Admitting jobs under a concurrency ceiling on a periodic tick
//! - Pausing, resuming and stopping jobs between tasks
//! - Evicting finished jobs after a retention window
//!
//! ## Components
//!
//! - **Tasks** (`task`): Deferred album/media work items and their tagged results
//! - **Sync Job State Machine** (`job`): Task queue, progress meter and control plane
//! - **Job Generator** (`generator`): Depth-first tree walk producing per-folder jobs
//! - **Scheduler** (`scheduler`): FIFO registry with admission control and garbage collection
//! - **Sync Coordinator** (`coordinator`): Validates requests and exposes status and control

pub mod coordinator;
pub mod error;
pub mod generator;
pub mod job;
pub mod scheduler;
pub mod task;

pub use coordinator::{normalize_path, SyncBatch, SyncCoordinator, BATCH_ID_OPTION};
pub use error::{Result, SyncError};
pub use generator::{build_lineage, AlbumResolver, JobGenerator};
pub use job::{Job, JobId, JobSnapshot, JobStatus, PATH_OPTION};
pub use scheduler::{Scheduler, TickReport};
pub use task::{Task, TaskContext, TaskKind, TaskOutcome, TaskResult};
