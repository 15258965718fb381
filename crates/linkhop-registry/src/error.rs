use linkhop_core::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Caller-visible failures of registry, identity and pipeline operations.
///
/// Each variant maps to its own wire response; none of them are collapsed
/// into a generic failure except [`RegistryError::Storage`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("short code was deleted: {0}")]
    Deleted(String),
    #[error("missing or invalid session token")]
    Unauthorized,
    #[error("deletion queue is full")]
    CapacityExceeded,
    #[error("deletion pipeline is shut down")]
    PipelineClosed,
    #[error("origin url already registered: {0}")]
    Conflict(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("storage backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("operation not supported by the configured backend: {0}")]
    Unsupported(&'static str),
    #[error("session token error: {0}")]
    Token(String),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Self::NotFound(key),
            StorageError::Deleted(key) => Self::Deleted(key),
            StorageError::Conflict(url) => Self::Conflict(url),
            StorageError::Unsupported(op) => Self::Unsupported(op),
            StorageError::Unavailable(msg) | StorageError::Timeout(msg) => {
                Self::BackendUnavailable(msg)
            }
            other => Self::Storage(other),
        }
    }
}
