use crate::{
    cache::{MokaCache, VolatileCache},
    classifier::{Classification, ResponseClassifier},
    config::Config,
    errors::WhoisError,
    extractor::{flatten_cells, FieldExtractor},
    origin::{HttpOrigin, OriginClient},
    store::{DurableStore, SqliteStore},
    LookupResult,
};
use moka::future::Cache;
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

// Constants to eliminate magic numbers
const TIER_WRITE_TIMEOUT_SECS: u64 = 5;
const IN_FLIGHT_IDLE_SECS: u64 = 120;

/// Which tier answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    VolatileCache,
    DurableStore,
    Origin,
}

impl LookupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupSource::VolatileCache => "volatile",
            LookupSource::DurableStore => "durable",
            LookupSource::Origin => "origin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lookup {
    pub result: LookupResult,
    pub source: LookupSource,
}

/// Read-through lookup: volatile cache, then durable store, then origin.
///
/// All collaborators are handed in at construction. `connect` builds the
/// production set from a `Config`; call `shutdown` before exit to release
/// the store's connections.
pub struct LookupService {
    cache: Arc<dyn VolatileCache>,
    store: Option<Arc<dyn DurableStore>>,
    origin: Arc<dyn OriginClient>,
    classifier: ResponseClassifier,
    extractor: FieldExtractor,
    cache_ttl: Duration,
    read_durable: bool,
    in_flight: Option<Cache<String, Arc<Mutex<()>>>>,
}

impl LookupService {
    pub fn new(
        config: &Config,
        cache: Arc<dyn VolatileCache>,
        store: Option<Arc<dyn DurableStore>>,
        origin: Arc<dyn OriginClient>,
    ) -> Self {
        let in_flight = config.coalesce_lookups.then(|| {
            Cache::builder()
                .max_capacity(config.cache_max_entries)
                .time_to_idle(Duration::from_secs(IN_FLIGHT_IDLE_SECS))
                .build()
        });

        Self {
            cache,
            store,
            origin,
            classifier: ResponseClassifier::from_config(config),
            extractor: FieldExtractor::new(),
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            read_durable: config.durable_tier_enabled,
            in_flight,
        }
    }

    /// Open the SQLite store, the in-memory cache and the HTTP origin client.
    pub async fn connect(config: Arc<Config>) -> Result<Self, WhoisError> {
        let store = SqliteStore::connect(&config).await?;
        let cache = MokaCache::new(config.clone());
        let origin = HttpOrigin::new(config.clone())?;

        info!(
            "LookupService initialized (durable tier {}, coalescing {})",
            if config.durable_tier_enabled { "on" } else { "off" },
            if config.coalesce_lookups { "on" } else { "off" },
        );

        Ok(Self::new(&config, Arc::new(cache), Some(Arc::new(store)), Arc::new(origin)))
    }

    pub async fn shutdown(&self) {
        if let Some(store) = &self.store {
            store.close().await;
            info!("Lookup store closed");
        }
    }

    pub async fn lookup(&self, domain_name: &str) -> Result<LookupResult, WhoisError> {
        self.lookup_traced(domain_name).await.map(|lookup| lookup.result)
    }

    /// Same as `lookup`, also reporting which tier answered.
    pub async fn lookup_traced(&self, domain_name: &str) -> Result<Lookup, WhoisError> {
        if !domain_name.contains('.') {
            return Err(WhoisError::InvalidDomain(domain_name.to_string()));
        }

        if let Some(result) = self.from_cache(domain_name).await {
            return Ok(Lookup { result, source: LookupSource::VolatileCache });
        }

        if let Some(result) = self.from_store(domain_name).await {
            return Ok(Lookup { result, source: LookupSource::DurableStore });
        }

        let _guard = match &self.in_flight {
            Some(locks) => {
                let lock = locks
                    .get_with(domain_name.to_string(), async { Arc::new(Mutex::new(())) })
                    .await;
                let guard = lock.lock_owned().await;

                // Whoever held the lock before us may have filled the cache.
                if let Some(result) = self.from_cache(domain_name).await {
                    return Ok(Lookup { result, source: LookupSource::VolatileCache });
                }
                Some(guard)
            }
            None => None,
        };

        let result = self.resolve(domain_name).await?;

        self.persist(domain_name, &result).await;
        self.remember(domain_name, &result).await;

        Ok(Lookup { result, source: LookupSource::Origin })
    }

    async fn from_cache(&self, domain_name: &str) -> Option<LookupResult> {
        match self.cache.get(domain_name).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!("Discarding unreadable cache entry for {}: {}", domain_name, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read error for {}: {}", domain_name, e);
                None
            }
        }
    }

    async fn from_store(&self, domain_name: &str) -> Option<LookupResult> {
        if !self.read_durable {
            return None;
        }
        let store = self.store.as_ref()?;

        match store.find_latest(domain_name).await {
            Ok(Some(record)) => {
                debug!("Store hit for domain: {} (row {})", domain_name, record.id);
                Some(record.into_result())
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Store read error for {}: {}", domain_name, e);
                None
            }
        }
    }

    async fn resolve(&self, domain_name: &str) -> Result<LookupResult, WhoisError> {
        info!("Fetching origin page for {}", domain_name);
        let response = self.origin.fetch(domain_name).await?;

        match self.classifier.classify(response.status, &response.body) {
            Classification::TransientError => {
                warn!("Origin reported a transient failure for {}", domain_name);
                Err(WhoisError::UpstreamUnavailable(self.classifier.transient_banner().to_string()))
            }
            Classification::Available => {
                debug!("{} is available for registration", domain_name);
                Err(WhoisError::not_occupied())
            }
            Classification::Unrecognized => {
                warn!("Unrecognized origin page for {} (HTTP {})", domain_name, response.status);
                Err(WhoisError::not_occupied())
            }
            Classification::Occupied => self.build_result(domain_name, &response.body),
        }
    }

    fn build_result(&self, domain_name: &str, body: &str) -> Result<LookupResult, WhoisError> {
        let text = flatten_cells(body);

        // No colon anywhere: the page loaded without a WHOIS table.
        if !text.contains(':') {
            debug!("No structured block on origin page for {}", domain_name);
            return Ok(LookupResult::occupied_placeholder(domain_name));
        }

        match self.extractor.extract(&text) {
            Ok(fields) => Ok(LookupResult::from_fields(fields)),
            Err(e) => {
                error!("Origin page for {} does not match the expected layout: {}", domain_name, e);
                Err(e)
            }
        }
    }

    async fn persist(&self, domain_name: &str, result: &LookupResult) {
        let Some(store) = &self.store else {
            return;
        };

        match tokio::time::timeout(
            Duration::from_secs(TIER_WRITE_TIMEOUT_SECS),
            store.append(domain_name, result),
        )
        .await
        {
            Ok(Ok(record)) => debug!("Persisted lookup for {} as row {}", domain_name, record.id),
            Ok(Err(e)) => {
                warn!("Failed to persist lookup for {}: {}", domain_name, e);
                record_error("store_write_error");
            }
            Err(_) => {
                warn!("Store write timeout for {}", domain_name);
                record_error("store_write_timeout");
            }
        }
    }

    async fn remember(&self, domain_name: &str, result: &LookupResult) {
        let json = match serde_json::to_string(result) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to encode lookup for {}: {}", domain_name, e);
                return;
            }
        };

        match tokio::time::timeout(
            Duration::from_secs(TIER_WRITE_TIMEOUT_SECS),
            self.cache.set_with_ttl(domain_name, json, self.cache_ttl),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Failed to cache result for {}: {}", domain_name, e);
                record_error("cache_write_error");
            }
            Err(_) => {
                warn!("Cache write timeout for {}", domain_name);
                record_error("cache_write_timeout");
            }
        }
    }
}

#[cfg(feature = "server")]
fn record_error(error_type: &str) {
    crate::metrics::increment_errors(error_type);
}

#[cfg(not(feature = "server"))]
fn record_error(_error_type: &str) {}
