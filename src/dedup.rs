//! In-flight request de-duplication
//!
//! Identical concurrent calls (same method, path and query parameters)
//! collapse onto a single execution. The shared result stays available for
//! a short window after completion, then the key is cleared. Failures are
//! never shared past the caller that produced them.

use crate::error::AppError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// Build a de-duplication key; query parameter order does not matter
pub fn dedup_key(method: &str, path: &str, query: Option<&str>) -> String {
    let mut pairs: Vec<(String, String)> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();
    pairs.sort();

    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();

    format!("{} {}?{}", method.to_ascii_uppercase(), path, encoded)
}

type InFlight<T> = Arc<Mutex<HashMap<String, Arc<OnceCell<T>>>>>;

pub struct RequestDeduplicator<T> {
    in_flight: InFlight<T>,
    window: Duration,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration) -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    /// Run `call` unless an identical call is already running or just finished
    pub async fn run<F, Fut>(&self, key: String, call: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let cell = {
            let mut map = self.in_flight.lock().await;
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let mut guard = Abandoned {
            in_flight: self.in_flight.clone(),
            key,
            cell,
            armed: true,
        };

        let mut leader = false;
        let result = guard
            .cell
            .get_or_try_init(|| {
                leader = true;
                call()
            })
            .await
            .cloned();

        guard.armed = false;
        let key = std::mem::take(&mut guard.key);
        let cell = guard.cell.clone();
        drop(guard);

        if !leader {
            debug!(key = %key, "Request collapsed onto in-flight call");
            return result;
        }

        match &result {
            Ok(_) if !self.window.is_zero() => self.schedule_clear(key, cell),
            _ => Self::clear(&self.in_flight, &key, &cell).await,
        }

        result
    }

    /// Number of keys currently tracked
    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    fn schedule_clear(&self, key: String, cell: Arc<OnceCell<T>>) {
        let in_flight = self.in_flight.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            Self::clear(&in_flight, &key, &cell).await;
        });
    }

    async fn clear(in_flight: &InFlight<T>, key: &str, cell: &Arc<OnceCell<T>>) {
        let mut map = in_flight.lock().await;
        // A later call may have replaced the entry; only drop our own
        if map.get(key).is_some_and(|existing| Arc::ptr_eq(existing, cell)) {
            map.remove(key);
        }
    }
}

/// Releases the key when the caller is dropped before its call finished
/// and nobody else is waiting on it
struct Abandoned<T: Send + Sync + 'static> {
    in_flight: InFlight<T>,
    key: String,
    cell: Arc<OnceCell<T>>,
    armed: bool,
}

impl<T: Send + Sync + 'static> Abandoned<T> {
    fn release(map: &mut HashMap<String, Arc<OnceCell<T>>>, key: &str, cell: &Arc<OnceCell<T>>) {
        // The map and this caller hold the only references
        if !cell.initialized()
            && Arc::strong_count(cell) <= 2
            && map.get(key).is_some_and(|existing| Arc::ptr_eq(existing, cell))
        {
            map.remove(key);
            debug!(key = %key, "Abandoned request released");
        }
    }
}

impl<T: Send + Sync + 'static> Drop for Abandoned<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut map) = self.in_flight.try_lock() {
            Self::release(&mut map, &self.key, &self.cell);
        } else if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let in_flight = self.in_flight.clone();
            let key = std::mem::take(&mut self.key);
            let cell = std::mem::replace(&mut self.cell, Arc::new(OnceCell::new()));
            handle.spawn(async move {
                let mut map = in_flight.lock().await;
                Self::release(&mut map, &key, &cell);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_key_ignores_param_order() {
        let a = dedup_key("get", "/api/proposals", Some("status=draft&page=2"));
        let b = dedup_key("GET", "/api/proposals", Some("page=2&status=draft"));
        assert_eq!(a, b);
        assert_ne!(a, dedup_key("GET", "/api/proposals", Some("page=3&status=draft")));
        assert_ne!(a, dedup_key("POST", "/api/proposals", Some("page=2&status=draft")));
    }

    #[test]
    fn test_key_without_query() {
        assert_eq!(dedup_key("get", "/api/dashboard/stats", None), "GET /api/dashboard/stats?");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_collapse() {
        let dedup = RequestDeduplicator::<u64>::new(Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let call = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<u64, AppError>(42)
        };

        let (a, b) = tokio::join!(
            dedup.run("k".into(), || call(calls.clone())),
            dedup.run("k".into(), || call(calls.clone())),
        );

        assert_eq!(a.unwrap(), 42);
        assert_eq!(b.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_cleared_after_window() {
        let dedup = RequestDeduplicator::<u64>::new(Duration::from_secs(1));
        let calls = Arc::new(AtomicUsize::new(0));

        let counted = |calls: Arc<AtomicUsize>| async move {
            Ok::<u64, AppError>(calls.fetch_add(1, Ordering::SeqCst) as u64)
        };

        assert_eq!(dedup.run("k".into(), || counted(calls.clone())).await.unwrap(), 0);
        // Inside the window the finished result is reused
        assert_eq!(dedup.run("k".into(), || counted(calls.clone())).await.unwrap(), 0);
        assert_eq!(dedup.in_flight().await, 1);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(dedup.in_flight().await, 0);
        assert_eq!(dedup.run("k".into(), || counted(calls.clone())).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_retained() {
        let dedup = RequestDeduplicator::<u64>::new(Duration::from_secs(30));

        let failed = dedup
            .run("k".into(), || async { Err(AppError::Internal("db down".into())) })
            .await;
        assert!(failed.is_err());
        assert_eq!(dedup.in_flight().await, 0);

        let ok = dedup.run("k".into(), || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_dropped_call_releases_key() {
        let dedup = RequestDeduplicator::<u64>::new(Duration::from_secs(30));

        let mut call = task::spawn(dedup.run("k".into(), std::future::pending));
        assert_pending!(call.poll());
        assert_eq!(dedup.in_flight().await, 1);

        drop(call);
        assert_eq!(dedup.in_flight().await, 0);
    }

    #[tokio::test]
    async fn test_waiter_takes_over_dropped_call() {
        let dedup = RequestDeduplicator::<u64>::new(Duration::from_secs(30));

        let mut first = task::spawn(dedup.run("k".into(), std::future::pending));
        let mut second = task::spawn(dedup.run("k".into(), || async { Ok(5) }));
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        // The waiter still needs the key
        drop(first);
        assert_eq!(dedup.in_flight().await, 1);

        let value = assert_ready!(second.poll());
        assert_eq!(value.unwrap(), 5);
    }
}
