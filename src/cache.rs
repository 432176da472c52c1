//! Expiring single-flight cache (C3).
//!
//! Coalesces concurrent readers of the same key onto one in-flight fetch and
//! serves from a TTL-bounded entry otherwise. Mirrors the lock discipline of
//! `ExpiringSingleFlightCache` in the original service: the mutex is held
//! only to inspect/mutate the entry and in-flight maps, never across the
//! fetcher call itself.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    Wait,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// One fetch result, broadcast to every waiter that coalesced onto it.
#[derive(Clone)]
enum FetchResult<V, E> {
    Ok(V),
    Err(E),
}

struct Inner<V, E> {
    entries: HashMap<String, Entry<V>>,
    in_flight: HashMap<String, broadcast::Sender<FetchResult<V, E>>>,
}

pub struct ExpiringSingleFlightCache<V, E> {
    inner: Mutex<Inner<V, E>>,
}

impl<V, E> Default for ExpiringSingleFlightCache<V, E> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            }),
        }
    }
}

impl<V, E> ExpiringSingleFlightCache<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the live cached value for `key`, or run exactly one `fetcher`
    /// invocation per set of concurrent callers and cache its result for
    /// `ttl`. Exceptions (`Err`) from `fetcher` are never cached.
    pub async fn get_or_set<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetcher: F,
    ) -> Result<(V, CacheOutcome), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut rx = {
            let mut guard = self.inner.lock().await;
            let now = Instant::now();
            evict_expired(&mut guard.entries, now);

            if let Some(entry) = guard.entries.get(key) {
                if entry.expires_at > now {
                    return Ok((entry.value.clone(), CacheOutcome::Hit));
                }
            }

            if let Some(sender) = guard.in_flight.get(key) {
                sender.subscribe()
            } else {
                let (tx, rx) = broadcast::channel(1);
                guard.in_flight.insert(key.to_string(), tx);
                drop(guard);
                return self.run_fetch(key, ttl, fetcher).await;
            }
        };

        match rx.recv().await {
            Ok(FetchResult::Ok(value)) => Ok((value, CacheOutcome::Wait)),
            Ok(FetchResult::Err(err)) => Err(err),
            Err(_) => unreachable!("fetch sender always sends exactly one result before closing"),
        }
    }

    async fn run_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetcher: F,
    ) -> Result<(V, CacheOutcome), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let result = fetcher().await;

        let mut guard = self.inner.lock().await;
        let sender = guard.in_flight.remove(key);

        match result {
            Ok(value) => {
                guard.entries.insert(
                    key.to_string(),
                    Entry {
                        value: value.clone(),
                        expires_at: Instant::now() + ttl,
                    },
                );
                drop(guard);
                if let Some(sender) = sender {
                    let _ = sender.send(FetchResult::Ok(value.clone()));
                }
                Ok((value, CacheOutcome::Miss))
            }
            Err(err) => {
                drop(guard);
                if let Some(sender) = sender {
                    let _ = sender.send(FetchResult::Err(err.clone()));
                }
                Err(err)
            }
        }
    }

    /// Remove a single entry.
    pub async fn invalidate(&self, key: &str) {
        self.inner.lock().await.entries.remove(key);
    }

    /// Remove all entries. Does not cancel in-flight fetches.
    pub async fn clear(&self) {
        self.inner.lock().await.entries.clear();
    }
}

fn evict_expired<V>(entries: &mut HashMap<String, Entry<V>>, now: Instant) {
    entries.retain(|_, entry| entry.expires_at > now);
}

pub type SharedCache<V, E> = Arc<ExpiringSingleFlightCache<V, E>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn coalesces_fifty_concurrent_callers() {
        let cache: Arc<ExpiringSingleFlightCache<i32, String>> =
            Arc::new(ExpiringSingleFlightCache::new());
        let fetch_count = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let cache = cache.clone();
            let fetch_count = fetch_count.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set("k", Duration::from_secs(60), || async move {
                        fetch_count.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<i32, String>(42)
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut misses = 0;
        let mut waits = 0;
        for h in handles {
            let (value, outcome) = h.await.unwrap();
            assert_eq!(value, 42);
            match outcome {
                CacheOutcome::Miss => misses += 1,
                CacheOutcome::Wait => waits += 1,
                CacheOutcome::Hit => panic!("unexpected hit during single fetch window"),
            }
        }

        assert_eq!(misses, 1);
        assert_eq!(waits, 49);
        assert_eq!(fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ttl_expiry_triggers_refetch() {
        let cache: ExpiringSingleFlightCache<i32, String> = ExpiringSingleFlightCache::new();

        let (v, outcome) = cache
            .get_or_set("k", Duration::from_millis(10), || async { Ok(1) })
            .await
            .unwrap();
        assert_eq!((v, outcome), (1, CacheOutcome::Miss));

        tokio::time::sleep(Duration::from_millis(20)).await;

        let (v, outcome) = cache
            .get_or_set("k", Duration::from_millis(10), || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!((v, outcome), (2, CacheOutcome::Miss));
    }

    #[tokio::test]
    async fn errors_are_never_cached() {
        let cache: ExpiringSingleFlightCache<i32, String> = ExpiringSingleFlightCache::new();

        let err = cache
            .get_or_set("k", Duration::from_secs(60), || async {
                Err::<i32, String>("boom".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");

        let (v, outcome) = cache
            .get_or_set("k", Duration::from_secs(60), || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!((v, outcome), (7, CacheOutcome::Miss));
    }

    #[tokio::test]
    async fn hit_after_miss_within_ttl() {
        let cache: ExpiringSingleFlightCache<i32, String> = ExpiringSingleFlightCache::new();
        cache
            .get_or_set("k", Duration::from_secs(60), || async { Ok(1) })
            .await
            .unwrap();
        let (v, outcome) = cache
            .get_or_set("k", Duration::from_secs(60), || async { Ok(999) })
            .await
            .unwrap();
        assert_eq!((v, outcome), (1, CacheOutcome::Hit));
    }
}
