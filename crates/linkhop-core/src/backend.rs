use crate::error::{Result, StorageError};
use crate::link::{BatchReport, LinkRecord, NewLink, User, UserId};
use crate::shortcode::ShortCode;
use async_trait::async_trait;

/// Storage capability shared by the memory, file-log and relational variants.
///
/// Operations that only make sense for a relational store have default
/// implementations returning [`StorageError::Unsupported`]. Callers must read
/// that as "not applicable" and never as a failure.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Rebuilds the working state from durable storage at startup.
    async fn restore(&self) -> Result<()>;

    /// Inserts a new link.
    ///
    /// Returns `Err(IdTaken)` if the short code is already in use and
    /// `Err(Conflict)` if the backend enforces origin-URL uniqueness and the
    /// URL is already registered.
    async fn add(&self, link: NewLink) -> Result<()>;

    /// Inserts several links at once.
    async fn add_batch(&self, links: Vec<NewLink>) -> Result<BatchReport>;

    /// Resolves a short code to its original URL.
    ///
    /// Returns `Err(NotFound)` for unknown codes and `Err(Deleted)` for
    /// soft-deleted ones.
    async fn get(&self, code: &ShortCode) -> Result<String>;

    /// Soft-deletes the given codes, skipping any not owned by `owner`.
    /// Returns the number of records that were flagged.
    async fn delete_batch(&self, owner: UserId, codes: &[ShortCode]) -> Result<usize>;

    /// Finds the short code already registered for an origin URL.
    async fn get_by_origin_url(&self, _original_url: &str) -> Result<ShortCode> {
        Err(StorageError::Unsupported("get_by_origin_url"))
    }

    /// Lists every link created by `owner`, deleted ones included.
    async fn list_by_owner(&self, _owner: UserId) -> Result<Vec<LinkRecord>> {
        Err(StorageError::Unsupported("list_by_owner"))
    }

    async fn health_check(&self) -> Result<()> {
        Err(StorageError::Unsupported("health_check"))
    }

    async fn create_user(&self) -> Result<User> {
        Err(StorageError::Unsupported("create_user"))
    }

    /// Returns `Ok(None)` if no user has this id.
    async fn find_user_by_id(&self, _id: UserId) -> Result<Option<User>> {
        Err(StorageError::Unsupported("find_user_by_id"))
    }

    async fn set_user_token(&self, _id: UserId, _token: &str) -> Result<()> {
        Err(StorageError::Unsupported("set_user_token"))
    }

    /// Flushes and releases underlying resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
