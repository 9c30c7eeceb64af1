//! In-memory shared store for single-process deployments and tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ghcache_core::{Clock, Error, Result, SharedStore, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Entry in the in-memory store.
struct StoredEntry {
    data: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// Operation counters for the in-memory store.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub gets: AtomicU64,
    pub sets: AtomicU64,
    pub expires: AtomicU64,
    pub failures: AtomicU64,
}

impl StoreStats {
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    pub fn expires(&self) -> u64 {
        self.expires.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Shared store held in process memory.
///
/// Expiry is evaluated lazily against the injected clock. The store can be
/// switched into a failing mode to simulate an unreachable backend.
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    clock: Arc<dyn Clock>,
    stats: StoreStats,
    failing: AtomicBool,
    failing_prefix: Mutex<Option<String>>,
}

impl InMemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            stats: StoreStats::default(),
            failing: AtomicBool::new(false),
            failing_prefix: Mutex::new(None),
        }
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail only operations on keys starting with `prefix`, or stop doing so.
    pub fn set_failing_prefix(&self, prefix: Option<&str>) {
        *self
            .failing_prefix
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = prefix.map(str::to_string);
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Expiry time of a live key.
    pub async fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at)
    }

    /// Live keys starting with `prefix`, sorted.
    pub async fn keys(&self, prefix: &str) -> Vec<String> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Delete everything.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    fn check_available(&self, key: &str) -> Result<()> {
        let prefix_failing = self
            .failing_prefix
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            .is_some_and(|prefix| key.starts_with(prefix));
        if prefix_failing || self.failing.load(Ordering::SeqCst) {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            return Err(Error::StoreUnavailable("in-memory store is offline".into()));
        }
        Ok(())
    }

    fn expiry(&self, ttl_minutes: u64) -> DateTime<Utc> {
        self.clock.now() + Duration::minutes(ttl_minutes as i64)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl SharedStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available(key)?;
        self.stats.gets.fetch_add(1, Ordering::Relaxed);

        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.data.clone())),
            Some(_) => {
                debug!(key = %key, "Expired entry evicted");
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_expire(&self, key: &str, value: &[u8], ttl_minutes: u64) -> Result<()> {
        self.check_available(key)?;
        self.stats.sets.fetch_add(1, Ordering::Relaxed);

        let entry = StoredEntry {
            data: value.to_vec(),
            expires_at: self.expiry(ttl_minutes),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_minutes: u64) -> Result<()> {
        self.check_available(key)?;
        self.stats.expires.fetch_add(1, Ordering::Relaxed);

        let now = self.clock.now();
        let expires_at = self.expiry(ttl_minutes);
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(key)
            && entry.expires_at > now
        {
            entry.expires_at = expires_at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghcache_core::ManualClock;

    fn store() -> (InMemoryStore, ManualClock) {
        let clock = ManualClock::default();
        (InMemoryStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_set_get_and_expire() {
        let (store, clock) = store();
        store.set_with_expire("a", b"value", 10).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"value".to_vec()));

        clock.advance_secs(11 * 60);
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.keys("").await.is_empty());
    }

    #[tokio::test]
    async fn test_expire_moves_deadline() {
        let (store, clock) = store();
        store.set_with_expire("a", b"value", 10).await.unwrap();
        store.expire("a", 60).await.unwrap();

        clock.advance_secs(30 * 60);
        assert!(store.get("a").await.unwrap().is_some());

        // Shortening works the same way.
        store.expire("a", 1).await.unwrap();
        clock.advance_secs(2 * 60);
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expire_on_missing_key_is_noop() {
        let (store, _clock) = store();
        store.expire("missing", 5).await.unwrap();
        assert!(store.get("missing").await.unwrap().is_none());
        assert_eq!(store.stats().expires(), 1);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let (store, _clock) = store();
        store.set_failing(true);
        assert!(matches!(
            store.get("a").await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(store.set_with_expire("a", b"x", 1).await.is_err());
        assert_eq!(store.stats().failures(), 2);

        store.set_failing(false);
        store.set_with_expire("a", b"x", 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_prefix_only_hits_matching_keys() {
        let (store, _clock) = store();
        store.set_failing_prefix(Some("body:"));
        assert!(store.set_with_expire("body:a", b"x", 1).await.is_err());
        store.set_with_expire("meta:a", b"x", 1).await.unwrap();
        assert_eq!(store.stats().failures(), 1);

        store.set_failing_prefix(None);
        store.set_with_expire("body:a", b"x", 1).await.unwrap();
    }
}
