//! Time-bounded caches in front of the data providers
//!
//! Each tool writes to one tier; tiers differ only in TTL. Only successful
//! results are stored, so a failed fetch is retried on the next call.
//! Concurrent misses on one key share a single fetch.

use cached::{Cached, TimedCache};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::config::MarketConfig;

/// Cache key for a provider request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Ticker, or the query for searches
    pub subject: String,
    /// Operation the value came from
    pub endpoint: String,
    /// Remaining parameters as JSON
    pub params: String,
}

impl CacheKey {
    pub fn new(
        subject: impl Into<String>,
        endpoint: impl Into<String>,
        params: impl Serialize,
    ) -> Self {
        Self {
            subject: subject.into(),
            endpoint: endpoint.into(),
            params: serde_json::to_string(&params).unwrap_or_default(),
        }
    }
}

/// Shared TTL cache of JSON values
#[derive(Clone)]
pub struct MarketCache {
    cache: Arc<RwLock<TimedCache<CacheKey, Value>>>,
    in_flight: Arc<Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>>,
}

impl MarketCache {
    /// Create a new cache with specified TTL
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        // TimedCache evicts on read, so lookups need the write lock
        let mut cache = self.cache.write().await;
        cache.cache_get(key).cloned()
    }

    pub async fn insert(&self, key: CacheKey, value: Value) {
        let mut cache = self.cache.write().await;
        cache.cache_set(key, value);
    }

    /// Return the cached value or run `fetcher` and cache its success
    pub async fn get_or_fetch<F, Fut, E>(&self, key: CacheKey, fetcher: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(value) = self.get(&key).await {
            debug!(subject = %key.subject, endpoint = %key.endpoint, "Cache hit");
            return Ok(value);
        }

        let slot = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(key.clone()).or_default())
        };
        let _guard = slot.lock().await;

        // Another caller may have filled the key while we waited
        if let Some(value) = self.get(&key).await {
            debug!(subject = %key.subject, endpoint = %key.endpoint, "Cache hit after wait");
            return Ok(value);
        }

        debug!(subject = %key.subject, endpoint = %key.endpoint, "Cache miss");
        let result = fetcher().await;
        if let Ok(value) = &result {
            self.insert(key.clone(), value.clone()).await;
        }
        self.in_flight.lock().await.remove(&key);
        result
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        let mut cache = self.cache.write().await;
        cache.cache_remove(key);
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// One cache per data tier
#[derive(Clone)]
pub struct CacheManager {
    /// Quotes and price history
    pub realtime: MarketCache,
    /// Company overview and balance sheet
    pub fundamental: MarketCache,
    /// Web search results
    pub search: MarketCache,
}

impl CacheManager {
    pub fn new(realtime_ttl: Duration, fundamental_ttl: Duration, search_ttl: Duration) -> Self {
        Self {
            realtime: MarketCache::new(realtime_ttl),
            fundamental: MarketCache::new(fundamental_ttl),
            search: MarketCache::new(search_ttl),
        }
    }

    /// Tiers sized from the configured TTLs
    pub fn from_config(config: &MarketConfig) -> Self {
        Self::new(
            config.cache_ttl_realtime,
            config.cache_ttl_fundamental,
            config.cache_ttl_search,
        )
    }

    pub async fn clear_all(&self) {
        self.realtime.clear().await;
        self.fundamental.clear().await;
        self.search.clear().await;
    }
}
