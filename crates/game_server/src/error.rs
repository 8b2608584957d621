//! Error types for the game server runtime.

use tick_scheduler::{TaskId, TaskOwner};

/// Errors raised by the server runtime.
///
/// Failures of scheduled work are reported through
/// [`ServerError::TaskFailed`] and [`ServerError::TaskPanicked`] so the
/// heartbeat can log them; they never stop the tick loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Config(String),
    /// The worker pool or heartbeat thread could not be started
    #[error("Worker error: {0}")]
    Worker(String),
    /// A scheduled task returned an error
    #[error("Task {id} of {owner} failed: {message}")]
    TaskFailed {
        id: TaskId,
        owner: TaskOwner,
        message: String,
    },
    /// A scheduled task panicked
    #[error("Task {id} of {owner} panicked: {message}")]
    TaskPanicked {
        id: TaskId,
        owner: TaskOwner,
        message: String,
    },
    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}
