use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
}

/// Errors reported by a [`Backend`](crate::Backend).
///
/// `NotFound` and `Deleted` are distinct on purpose: callers answer "gone"
/// for a soft-deleted link and "not found" for one that never existed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("short code was deleted: {0}")]
    Deleted(String),
    #[error("origin url already exists: {0}")]
    Conflict(String),
    #[error("short code already taken: {0}")]
    IdTaken(String),
    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage io failed: {0}")]
    Io(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

impl StorageError {
    /// Returns `true` when the backend does not implement the operation.
    ///
    /// This means "not applicable" rather than failure.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, StorageError::Unsupported(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}
