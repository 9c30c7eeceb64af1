//! Process-private cache of the latest decoded body per key.

use ghcache_core::CacheKey;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

struct LocalEntry {
    validator: String,
    value: Arc<Value>,
}

#[derive(Default)]
struct LocalInner {
    entries: HashMap<CacheKey, LocalEntry>,
    order: VecDeque<CacheKey>,
}

/// Ephemeral cache of decoded bodies, keyed by cache key.
///
/// An entry only answers for the validator it was stored with, so a newer
/// version persisted by another worker is never masked. Entries carry no
/// expiry; the oldest inserted key is evicted at capacity.
pub struct LocalCache {
    capacity: usize,
    inner: RwLock<LocalInner>,
}

impl LocalCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(LocalInner::default()),
        }
    }

    /// Cached value for `key` if it is at `validator`.
    pub async fn get(&self, key: &CacheKey, validator: &str) -> Option<Arc<Value>> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(key)
            .filter(|entry| entry.validator == validator)
            .map(|entry| entry.value.clone())
    }

    /// Store the latest value for `key`.
    pub async fn insert(&self, key: &CacheKey, validator: &str, value: Arc<Value>) {
        if self.capacity == 0 {
            return;
        }

        let mut inner = self.inner.write().await;
        let entry = LocalEntry {
            validator: validator.to_string(),
            value,
        };
        if inner.entries.insert(key.clone(), entry).is_some() {
            return;
        }

        inner.order.push_back(key.clone());
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    pub async fn remove(&self, key: &CacheKey) {
        let mut inner = self.inner.write().await;
        if inner.entries.remove(key).is_some() {
            inner.order.retain(|k| k != key);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.order.clear();
    }
}
