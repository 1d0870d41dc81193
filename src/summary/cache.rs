// Time-to-live cache for subsystem summaries
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::clock::Clock;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Read-mostly cache whose entries expire strictly after `ttl`.
///
/// Readers share the lock; refreshes are serialised per key so a burst of
/// callers on an expired key triggers a single fetch.
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    store: RwLock<HashMap<K, CacheEntry<V>>>,
    refresh: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            store: RwLock::new(HashMap::new()),
            refresh: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry<V>) -> bool {
        self.clock.now().saturating_duration_since(entry.stored_at) <= self.ttl
    }

    /// Cached value if it has not expired.
    pub async fn get(&self, key: &K) -> Option<V> {
        let store = self.store.read().await;
        store
            .get(key)
            .filter(|entry| self.is_fresh(entry))
            .map(|entry| entry.value.clone())
    }

    /// Cached value, or the result of `fetch` stored under `key`.
    pub async fn get_or_refresh<F, Fut>(&self, key: K, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(value) = self.get(&key).await {
            return value;
        }

        let key_lock = self.refresh.lock().await.entry(key.clone()).or_default().clone();
        let _refresh = key_lock.lock().await;
        // Another caller may have refreshed while we waited
        if let Some(value) = self.get(&key).await {
            return value;
        }

        let value = fetch().await;
        let mut store = self.store.write().await;
        store.insert(
            key,
            CacheEntry {
                value: value.clone(),
                stored_at: self.clock.now(),
            },
        );
        value
    }

    /// Time since the entry was stored, expired or not.
    pub async fn age(&self, key: &K) -> Option<Duration> {
        let store = self.store.read().await;
        store
            .get(key)
            .map(|entry| self.clock.now().saturating_duration_since(entry.stored_at))
    }

    pub async fn invalidate(&self, key: &K) {
        self.store.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.store.write().await.clear();
    }
}
