use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Optimistic concurrency check failed: the document moved since it was read,
    /// or a unique key (session id, join code) is already taken.
    #[error("write conflict: {0}")]
    Conflict(String),
    /// The backend did not answer in time.
    #[error("storage operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    /// Backend cannot be reached.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Operation that failed.
        message: String,
        /// Driver error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The document to update no longer exists.
    #[error("document vanished: {0}")]
    Missing(String),
    /// A stored document cannot be decoded into the aggregate.
    #[error("corrupted document: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Contention and timeouts are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Conflict(_) | StorageError::Timeout(_))
    }
}
