use crate::{config::Config, errors::WhoisError};
use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

/// First lookup tier: a key-value store whose entries expire on their own.
///
/// Values are the JSON encoding of a `LookupResult`, keyed by the domain
/// name exactly as requested.
#[async_trait]
pub trait VolatileCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, WhoisError>;

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), WhoisError>;
}

#[derive(Debug, Clone)]
struct CachedEntry {
    json: Arc<str>,
    ttl: Duration,
}

/// Each entry lives for the TTL it was written with; rewriting a key resets it.
struct PerEntryTtl;

impl Expiry<String, CachedEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CachedEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process volatile tier backed by moka.
pub struct MokaCache {
    cache: Cache<String, CachedEntry>,
}

impl MokaCache {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_capacity(config.cache_max_entries)
    }

    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();

        Self { cache }
    }
}

#[async_trait]
impl VolatileCache for MokaCache {
    async fn get(&self, key: &str) -> Result<Option<String>, WhoisError> {
        match self.cache.get(key).await {
            Some(entry) => {
                debug!("Cache hit for domain: {}", key);
                Ok(Some(entry.json.to_string()))
            }
            None => {
                debug!("Cache miss for domain: {}", key);
                Ok(None)
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<(), WhoisError> {
        let entry = CachedEntry { json: value.into(), ttl };
        self.cache.insert(key.to_string(), entry).await;
        debug!("Cached response for domain: {} (ttl {}s)", key, ttl.as_secs());
        Ok(())
    }
}
