use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use linkhop_core::{BatchReport, Backend, NewLink, Result, ShortCode, StorageError, UserId};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
struct Entry {
    original_url: String,
    owner: UserId,
    deleted: bool,
}

/// Volatile backend. Everything is lost when the process exits.
///
/// Origin URLs are not deduplicated: submitting the same URL twice yields two
/// independent codes.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    storage: DashMap<String, Entry>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            storage: DashMap::new(),
        }
    }

    /// Number of stored links, deleted ones included.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn restore(&self) -> Result<()> {
        trace!("in-memory backend has nothing to restore");
        Ok(())
    }

    async fn add(&self, link: NewLink) -> Result<()> {
        match self.storage.entry(link.code.as_str().to_owned()) {
            MapEntry::Occupied(_) => Err(StorageError::IdTaken(link.code.to_string())),
            MapEntry::Vacant(slot) => {
                slot.insert(Entry {
                    original_url: link.original_url,
                    owner: link.owner,
                    deleted: false,
                });
                Ok(())
            }
        }
    }

    async fn add_batch(&self, links: Vec<NewLink>) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for link in links {
            let code = link.code.clone();
            match self.add(link).await {
                Ok(()) => report.stored.push(code),
                Err(e) => {
                    warn!(code = %code, error = %e, "skipping batch record");
                    report.failed.push((code, e));
                }
            }
        }

        Ok(report)
    }

    async fn get(&self, code: &ShortCode) -> Result<String> {
        let Some(entry) = self.storage.get(code.as_str()) else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        if entry.deleted {
            return Err(StorageError::Deleted(code.to_string()));
        }

        Ok(entry.original_url.clone())
    }

    async fn delete_batch(&self, owner: UserId, codes: &[ShortCode]) -> Result<usize> {
        let mut flagged = 0;

        for code in codes {
            let Some(mut entry) = self.storage.get_mut(code.as_str()) else {
                continue;
            };

            if entry.owner != owner {
                debug!(code = %code, owner = %owner, "skipping link owned by another user");
                continue;
            }

            if !entry.deleted {
                entry.deleted = true;
                flagged += 1;
            }
        }

        Ok(flagged)
    }
}
