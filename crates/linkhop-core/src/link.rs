use crate::error::StorageError;
use crate::shortcode::ShortCode;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identifier of a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owner of every link stored by a backend without a user table.
pub const SYNTHETIC_OWNER: UserId = UserId::new(1);

/// A durable user record and the session token currently bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// `None` between creation and the first token being persisted.
    pub token: Option<String>,
}

/// A stored link as returned by owner listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub uuid: String,
    pub code: ShortCode,
    pub original_url: String,
    pub owner: Option<UserId>,
    pub deleted: bool,
}

/// A link about to be written to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub uuid: String,
    pub code: ShortCode,
    pub original_url: String,
    pub owner: UserId,
}

impl NewLink {
    /// Creates a link stamped with a fresh random UUID.
    pub fn new(code: ShortCode, original_url: impl Into<String>, owner: UserId) -> Self {
        Self::with_uuid(uuid::Uuid::new_v4().to_string(), code, original_url, owner)
    }

    pub fn with_uuid(
        uuid: impl Into<String>,
        code: ShortCode,
        original_url: impl Into<String>,
        owner: UserId,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            code,
            original_url: original_url.into(),
            owner,
        }
    }
}

/// Outcome of a best-effort batch insert.
///
/// Transactional backends never report partial failures here: they fail the
/// whole call instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub stored: Vec<ShortCode>,
    pub failed: Vec<(ShortCode, StorageError)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
