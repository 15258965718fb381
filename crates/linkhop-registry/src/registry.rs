use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use linkhop_core::{Backend, LinkRecord, NewLink, ShortCode, StorageError, UserId};
use linkhop_generator::{Generator, RandomGenerator};
use moka::future::Cache;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};
use typed_builder::TypedBuilder;

use crate::error::{RegistryError, Result};

/// Tunables for [`Registry`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct RegistryConfig {
    /// Maximum number of resolved links kept in memory.
    #[builder(default = 10_000)]
    pub cache_capacity: u64,
    /// How long a cached resolution may be served before it is re-read.
    #[builder(default = Duration::from_secs(60))]
    pub cache_ttl: Duration,
    /// How many fresh codes to try when the backend reports one as taken.
    #[builder(default = 5)]
    pub max_code_attempts: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddStatus {
    /// A new link was stored.
    Created,
    /// The origin URL was already registered; the existing code is returned.
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub code: ShortCode,
    pub status: AddStatus,
}

impl AddOutcome {
    pub fn is_conflict(&self) -> bool {
        self.status == AddStatus::Existing
    }
}

/// One URL of a batch submission, tagged by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub correlation_id: String,
    pub code: ShortCode,
}

/// Removes surrounding whitespace, embedded spaces and `%20` sequences.
///
/// Returns [`RegistryError::InvalidUrl`] when nothing is left.
pub fn normalize_url(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .replace("%20", "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return Err(RegistryError::InvalidUrl("url cannot be empty".to_string()));
    }

    Ok(cleaned)
}

/// Single entry point for link operations.
///
/// Wraps whichever [`Backend`] was configured at startup and keeps a
/// read-through cache of live resolutions. Only successful lookups are
/// cached, so "not found" and "deleted" always come from the backend.
pub struct Registry<G: Generator = RandomGenerator> {
    backend: Arc<dyn Backend>,
    generator: Arc<G>,
    cache: Cache<String, String>,
    /// Bumped by every deletion. A lookup that started under an older value
    /// must not fill the cache.
    deletion_epoch: Arc<RwLock<u64>>,
    max_code_attempts: usize,
}

impl<G: Generator> Clone for Registry<G> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            generator: Arc::clone(&self.generator),
            cache: self.cache.clone(),
            deletion_epoch: Arc::clone(&self.deletion_epoch),
            max_code_attempts: self.max_code_attempts,
        }
    }
}

impl<G: Generator> Registry<G> {
    pub fn new(backend: Arc<dyn Backend>, generator: G, config: RegistryConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(config.cache_ttl)
            .build();

        Self {
            backend,
            generator: Arc::new(generator),
            cache,
            deletion_epoch: Arc::new(RwLock::new(0)),
            max_code_attempts: config.max_code_attempts.max(1),
        }
    }

    /// Loads the backend's durable state. Call once before serving.
    pub async fn restore(&self) -> Result<()> {
        self.backend.restore().await?;
        info!("registry restored");
        Ok(())
    }

    /// Shortens `original_url` on behalf of `owner`.
    ///
    /// If the backend already holds the URL, the existing code comes back
    /// with [`AddStatus::Existing`] and nothing is written.
    pub async fn add(&self, original_url: &str, owner: UserId) -> Result<AddOutcome> {
        let url = normalize_url(original_url)?;

        for attempt in 1..=self.max_code_attempts {
            let code: ShortCode = self.generator.generate().into();
            let link = NewLink::new(code.clone(), url.as_str(), owner);

            match self.backend.add(link).await {
                Ok(()) => {
                    self.cache.insert(code.as_str().to_owned(), url).await;
                    debug!(code = %code, owner = %owner, "link created");
                    return Ok(AddOutcome {
                        code,
                        status: AddStatus::Created,
                    });
                }
                Err(StorageError::Conflict(_)) => {
                    let existing = self.backend.get_by_origin_url(&url).await?;
                    debug!(code = %existing, "origin url already registered");
                    return Ok(AddOutcome {
                        code: existing,
                        status: AddStatus::Existing,
                    });
                }
                Err(StorageError::IdTaken(_)) => {
                    debug!(code = %code, attempt, "generated code already taken");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Storage(StorageError::Operation(format!(
            "no free short code after {} attempts",
            self.max_code_attempts
        ))))
    }

    /// Shortens several URLs at once.
    ///
    /// Entries come back in input order for the items the backend stored.
    /// Items whose URL is empty after normalization are skipped. Best-effort
    /// backends skip failing items; transactional ones fail the whole call.
    pub async fn add_batch(&self, owner: UserId, items: Vec<BatchItem>) -> Result<Vec<BatchEntry>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut links = Vec::with_capacity(items.len());
        let mut order = Vec::with_capacity(items.len());
        let mut used = HashSet::with_capacity(items.len());

        for item in items {
            let url = match normalize_url(&item.original_url) {
                Ok(url) => url,
                Err(e) => {
                    warn!(correlation_id = %item.correlation_id, error = %e, "skipping batch item");
                    continue;
                }
            };
            let code = self.unique_within(&used)?;
            used.insert(code.clone());
            order.push((item.correlation_id.clone(), code.clone(), url.clone()));
            links.push(NewLink::with_uuid(item.correlation_id, code, url, owner));
        }

        if links.is_empty() {
            return Ok(Vec::new());
        }

        let report = self.backend.add_batch(links).await?;

        for (code, err) in &report.failed {
            warn!(code = %code, error = %err, "batch item was not stored");
        }

        let stored: HashSet<&ShortCode> = report.stored.iter().collect();
        let mut entries = Vec::with_capacity(stored.len());

        for (correlation_id, code, url) in order {
            if !stored.contains(&code) {
                continue;
            }
            self.cache.insert(code.as_str().to_owned(), url).await;
            entries.push(BatchEntry {
                correlation_id,
                code,
            });
        }

        debug!(owner = %owner, stored = entries.len(), "batch created");
        Ok(entries)
    }

    /// Draws a code not already assigned to another item of the same batch.
    fn unique_within(&self, used: &HashSet<ShortCode>) -> Result<ShortCode> {
        for _ in 0..self.max_code_attempts {
            let code: ShortCode = self.generator.generate().into();
            if !used.contains(&code) {
                return Ok(code);
            }
        }

        Err(RegistryError::Storage(StorageError::Operation(format!(
            "no distinct short code after {} attempts",
            self.max_code_attempts
        ))))
    }

    /// Resolves a code to its original URL.
    ///
    /// Fails with [`RegistryError::NotFound`] or [`RegistryError::Deleted`].
    pub async fn get(&self, code: &ShortCode) -> Result<String> {
        if let Some(url) = self.cache.get(code.as_str()).await {
            trace!(code = %code, "cache hit");
            return Ok(url);
        }

        trace!(code = %code, "cache miss");
        let epoch = *self.deletion_epoch.read().await;
        let url = self.backend.get(code).await?;

        let current = self.deletion_epoch.read().await;
        if *current == epoch {
            self.cache.insert(code.as_str().to_owned(), url.clone()).await;
        } else {
            trace!(code = %code, "deletion raced the lookup, not caching");
        }
        Ok(url)
    }

    pub async fn get_by_origin_url(&self, original_url: &str) -> Result<ShortCode> {
        let url = normalize_url(original_url)?;
        Ok(self.backend.get_by_origin_url(&url).await?)
    }

    /// Every link `owner` created, soft-deleted ones included.
    pub async fn list_by_owner(&self, owner: UserId) -> Result<Vec<LinkRecord>> {
        Ok(self.backend.list_by_owner(owner).await?)
    }

    /// Soft-deletes the codes owned by `owner` and drops them from the cache.
    pub async fn delete_batch(&self, owner: UserId, codes: &[ShortCode]) -> Result<usize> {
        let result = self.backend.delete_batch(owner, codes).await;

        let mut epoch = self.deletion_epoch.write().await;
        *epoch += 1;
        for code in codes {
            self.cache.invalidate(code.as_str()).await;
        }
        drop(epoch);

        let flagged = result?;
        debug!(owner = %owner, requested = codes.len(), flagged, "links deleted");
        Ok(flagged)
    }

    pub async fn health_check(&self) -> Result<()> {
        Ok(self.backend.health_check().await?)
    }

    pub async fn close(&self) -> Result<()> {
        self.backend.close().await?;
        info!("registry closed");
        Ok(())
    }
}

impl Registry<RandomGenerator> {
    /// Registry with the default 10-character random codes.
    pub fn with_defaults(backend: Arc<dyn Backend>) -> Self {
        Self::new(backend, RandomGenerator::default(), RegistryConfig::default())
    }
}
