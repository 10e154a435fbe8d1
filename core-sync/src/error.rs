use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Invalid sync path: {0}")]
    InvalidPath(String),

    #[error("Folder discovery failed: {0}")]
    Discovery(String),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid job status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Scheduler has been stopped")]
    SchedulerStopped,
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::NotADirectory(path) => {
                SyncError::InvalidPath(format!("not a directory: {}", path))
            }
            other => SyncError::Task(other.to_string()),
        }
    }
}
