//! Error types for repository operations

use std::fmt;

/// Result type alias for repository operations
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors that can occur during repository operations
#[derive(Debug)]
pub enum RepoError {
    /// Store connection failed
    ConnectionFailed(String),

    /// Query failed
    QueryFailed(String),

    /// A row the operation depends on does not exist
    ///
    /// Writes against missing rows are rejected rather than silently
    /// creating orphaned history.
    MissingRow(String),
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to persistent store: {}", msg)
            }
            RepoError::QueryFailed(msg) => write!(f, "store query failed: {}", msg),
            RepoError::MissingRow(msg) => write!(f, "missing row: {}", msg),
        }
    }
}

impl std::error::Error for RepoError {}
