//! Process-local TTL cache
//!
//! String keys map to JSON values with a per-entry time-to-live. Expired
//! entries are dropped lazily on read and eagerly by a periodic sweep.
//! Nothing is shared between processes and everything is lost on restart.

use crate::error::AppError;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct CacheEntry {
    data: serde_json::Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.inserted_at + self.ttl
    }
}

/// Hit/miss counters and current size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Thread-safe TTL cache
pub struct CacheService {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheService {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Key helper: `"{tenant}:{resource}:{rest}"`
    pub fn tenant_key(tenant_id: uuid::Uuid, resource: &str, rest: &str) -> String {
        format!("{}:{}:{}", tenant_id, resource, rest)
    }

    /// Get a live value, dropping it if it has expired
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired_at(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.data.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        // Expired: re-check under the write lock, a writer may have refreshed it
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if !entry.is_expired_at(Instant::now()) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.data.clone());
            }
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub async fn set(&self, key: impl Into<String>, data: serde_json::Value) {
        self.set_with_ttl(key, data, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: impl Into<String>, data: serde_json::Value, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.into(),
            CacheEntry {
                data,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Return the cached value for `key`, or compute, store and return it
    pub async fn get_or_insert_with<T, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if let Some(cached) = self.get(key).await {
            match serde_json::from_value(cached) {
                Ok(value) => return Ok(value),
                Err(e) => debug!(key, error = %e, "Discarding undecodable cache entry"),
            }
        }

        let value = compute().await?;
        let encoded = serde_json::to_value(&value)
            .map_err(|e| AppError::Internal(format!("Failed to encode cache entry: {}", e)))?;
        self.set_with_ttl(key, encoded, ttl.unwrap_or(self.default_ttl))
            .await;
        Ok(value)
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Remove every key starting with `prefix`, returning how many went
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(prefix, removed, "Cache entries invalidated");
        }
        removed
    }

    /// Drop every expired entry
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().await.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Sweep on a fixed interval until `cancel` fires
    pub async fn run_sweeper(&self, interval: Duration, cancel: CancellationToken) {
        info!(interval_secs = interval.as_secs(), "Cache sweeper started");
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Cache sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = self.sweep().await;
                    if removed > 0 {
                        debug!(removed, "Cache sweep removed expired entries");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = CacheService::new(Duration::from_secs(10));
        cache.set("t:dashboard:stats", json!({"total": 3})).await;

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("t:dashboard:stats").await, Some(json!({"total": 3})));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("t:dashboard:stats").await, None);

        let stats = cache.stats().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = CacheService::new(Duration::from_secs(60));
        cache.set_with_ttl("short", json!(1), Duration::from_secs(1)).await;
        cache.set("long", json!(2)).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.get("long").await, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_invalidate_prefix() {
        let cache = CacheService::new(Duration::from_secs(60));
        cache.set("a:products:list", json!([])).await;
        cache.set("a:products:42", json!({})).await;
        cache.set("a:proposals:list", json!([])).await;
        cache.set("b:products:list", json!([])).await;

        assert_eq!(cache.invalidate_prefix("a:products:").await, 2);
        assert!(cache.get("a:proposals:list").await.is_some());
        assert!(cache.get("b:products:list").await.is_some());
    }

    #[tokio::test]
    async fn test_get_or_insert_with_computes_once() {
        let cache = CacheService::new(Duration::from_secs(60));
        let calls = Arc::new(AtomicU64::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            let value: Vec<u32> = cache
                .get_or_insert_with("k", None, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compute_error_is_not_cached() {
        let cache = CacheService::new(Duration::from_secs(60));
        let result: Result<u32, AppError> = cache
            .get_or_insert_with("k", None, || async {
                Err(AppError::Internal("boom".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_cancel() {
        let cache = Arc::new(CacheService::new(Duration::from_secs(1)));
        cache.set("k", json!(true)).await;
        let cancel = CancellationToken::new();

        let handle = {
            let cache = cache.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { cache.run_sweeper(Duration::from_secs(2), cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(cache.stats().await.entries, 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
