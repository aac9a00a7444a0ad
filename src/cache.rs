use moka::future::Cache as MokaCache;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_capacity: 10_000,
        }
    }
}

impl CacheConfig {
    /// Reads `CHART_CACHE_TTL_SECS` / `CHART_CACHE_MAX_CAPACITY`, falling back to
    /// the defaults above on anything missing or unparsable.
    pub fn from_env() -> Self {
        let ttl = std::env::var("CHART_CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));
        let max_capacity = std::env::var("CHART_CACHE_MAX_CAPACITY")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10_000);
        Self { ttl, max_capacity }
    }
}

#[derive(Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shared, TTL'd cache for chart orchestration results and report-card
/// service reads. Keys must already incorporate tenant identity or
/// data-source id upstream; this cache performs no scoping of its own.
#[derive(Clone)]
pub struct ChartCache {
    inner: MokaCache<String, Arc<serde_json::Value>>,
    counters: Arc<CacheCounters>,
}

impl ChartCache {
    pub fn new(config: CacheConfig) -> Self {
        let inner = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.ttl)
            .build();
        Self {
            inner,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<serde_json::Value>> {
        match self.inner.get(key).await {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn put(&self, key: String, value: serde_json::Value) {
        self.inner.insert(key, Arc::new(value)).await;
    }

    /// Invalidate every entry whose key is prefixed by `data_source_id`.
    /// Used when a data source's column catalog or measure set changes.
    pub fn invalidate_data_source(&self, data_source_id: i64) {
        let prefix = format!("ds:{data_source_id}:");
        self.inner.invalidate_entries_if(move |k, _v| k.starts_with(&prefix)).ok();
    }

    pub fn invalidate_key(&self, key: &str) {
        self.inner.invalidate(key);
    }

    pub fn metrics(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit_updates_metrics() {
        let cache = ChartCache::new(CacheConfig::default());
        assert!(cache.get("k").await.is_none());
        cache.put("k".to_string(), serde_json::json!({"v": 1})).await;
        assert!(cache.get("k").await.is_some());
        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[tokio::test]
    async fn invalidate_data_source_clears_prefixed_keys_only() {
        let cache = ChartCache::new(CacheConfig::default());
        cache.put("ds:1:chart:a".to_string(), serde_json::json!(1)).await;
        cache.put("ds:2:chart:b".to_string(), serde_json::json!(2)).await;
        cache.invalidate_data_source(1);
        cache.inner.run_pending_tasks().await;
        assert!(cache.get("ds:1:chart:a").await.is_none());
        assert!(cache.get("ds:2:chart:b").await.is_some());
    }
}
