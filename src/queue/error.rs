//! Error types for queue operations

use std::fmt;

use super::queue::JobId;

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur during queue operations
#[derive(Debug)]
pub enum QueueError {
    /// The job id does not exist (never enqueued, or already purged)
    UnknownJob(JobId),

    /// The job exists but is not currently leased by anyone
    ///
    /// Raised for ack/nack/renew once the lease has already been reclaimed.
    NotInFlight(JobId),

    /// Backend-specific error
    Backend(String),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::UnknownJob(id) => write!(f, "unknown job {}", id),
            QueueError::NotInFlight(id) => write!(f, "job {} is not in flight", id),
            QueueError::Backend(msg) => write!(f, "queue backend error: {}", msg),
        }
    }
}

impl std::error::Error for QueueError {}
