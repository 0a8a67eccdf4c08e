//! In-process backend on top of moka.
//!
//! Unlike a plain moka cache with one cache-wide TTL, every entry carries its
//! own time-to-live (tool results and reference payloads expire at different
//! rates), enforced through moka's [`Expiry`] hook.
//!
//! State is per process and per instance. Two `memory://` providers in the
//! same registry do not share entries.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use tracing::debug;

use super::traits::KeyValueBackend;
use crate::Result;

/// Default maximum number of entries.
const DEFAULT_MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
struct MemoryEntry {
    value: String,
    ttl: Duration,
}

/// Per-entry TTL policy: an entry lives for the TTL it was last written with.
struct PerEntryTtl;

impl Expiry<String, MemoryEntry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory key-value backend.
pub struct MemoryBackend {
    cache: Cache<String, MemoryEntry>,
}

impl MemoryBackend {
    /// Create an empty backend with the default capacity (10,000 entries).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    /// Create an empty backend with a custom capacity.
    pub fn with_max_entries(max: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Number of live entries (approximate until pending tasks run).
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether the backend holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.cache
            .insert(
                key.to_string(),
                MemoryEntry {
                    value: value.to_string(),
                    ttl,
                },
            )
            .await;
        debug!(key, ttl_seconds = ttl.as_secs(), "memory SET");
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_str().to_owned())
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn info(&self) -> Result<String> {
        self.cache.run_pending_tasks().await;
        Ok(format!("memory ({} entries)", self.cache.entry_count()))
    }
}
