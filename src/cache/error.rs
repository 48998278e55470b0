//! Error types for cache operations

use std::fmt;

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur when talking to the cache store
#[derive(Debug)]
pub enum CacheError {
    /// Connection to the cache backend failed
    ConnectionFailed(String),

    /// A read or write against the cache failed
    OperationFailed(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to cache backend: {}", msg)
            }
            CacheError::OperationFailed(msg) => write!(f, "cache operation failed: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}
