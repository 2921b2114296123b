//! Worker error types.
//!
//! Task-level failures never surface here; they become error results.
//! These errors cover startup and broker-level failures.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Startup failed: {0}")]
    StartupFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] tonework_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] tonework_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] tonework_queue::QueueError),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn startup_failed(msg: impl Into<String>) -> Self {
        Self::StartupFailed(msg.into())
    }

    /// Process exit code for this error.
    ///
    /// 2 for configuration problems, 3 when the broker retry budget is
    /// exhausted, 1 for any other unrecoverable failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerError::ConfigError(_)
            | WorkerError::Storage(tonework_storage::StorageError::ConfigError(_))
            | WorkerError::Media(tonework_media::MediaError::UnknownTool(_))
            | WorkerError::Queue(tonework_queue::QueueError::Config(_)) => 2,
            WorkerError::Queue(tonework_queue::QueueError::RetriesExhausted { .. }) => 3,
            _ => 1,
        }
    }
}
