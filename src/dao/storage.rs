use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Backend-neutral store failure. Every variant is a transient network condition from the
/// session's point of view.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A database driver reported a failure.
    #[error("{backend} store failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The store refused the request without an underlying driver error.
    #[error("store offline: {0}")]
    Offline(String),
}

impl StorageError {
    /// Wrap a driver error, keeping its message for logs and client-facing events.
    pub fn backend(backend: &'static str, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Backend {
            backend,
            message: source.to_string(),
            source: Box::new(source),
        }
    }
}
