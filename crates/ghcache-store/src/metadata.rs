//! Metadata record store.
//!
//! Store failures never surface from here: reads degrade to "absent" and
//! writes are logged, so the caller falls back to a remote fetch.

use ghcache_core::{CacheKey, Cost, MetadataRecord, SharedStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Typed view of metadata records in the shared store.
#[derive(Clone)]
pub struct MetadataStore {
    store: Arc<dyn SharedStore>,
    prefix: String,
}

impl MetadataStore {
    pub fn new(store: Arc<dyn SharedStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Shared store key holding the metadata for `key`.
    pub fn store_key(&self, key: &CacheKey) -> String {
        format!("{}meta:{}", self.prefix, key)
    }

    /// Load the metadata for `key`, treating any failure as absent.
    pub async fn get(&self, key: &CacheKey, cost: &mut Cost) -> Option<MetadataRecord> {
        cost.metadata_gets += 1;
        let bytes = match self.store.get(&self.store_key(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                cost.store_errors += 1;
                warn!(key = %key, error = %e, "Metadata read failed, treating as uncached");
                return None;
            }
        };

        match serde_json::from_slice::<MetadataRecord>(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(key = %key, error = %e, "Unreadable metadata record ignored");
                None
            }
        }
    }

    /// Write the metadata for `key`. Returns whether the write succeeded.
    pub async fn put(
        &self,
        key: &CacheKey,
        record: &MetadataRecord,
        ttl_minutes: u64,
        cost: &mut Cost,
    ) -> bool {
        let bytes = match serde_json::to_vec(record) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Metadata record could not be serialized");
                return false;
            }
        };

        cost.metadata_sets += 1;
        match self
            .store
            .set_with_expire(&self.store_key(key), &bytes, ttl_minutes)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                cost.store_errors += 1;
                warn!(key = %key, error = %e, "Metadata write failed");
                false
            }
        }
    }

    /// Reset the expiry of the metadata for `key`.
    pub async fn expire(&self, key: &CacheKey, ttl_minutes: u64, cost: &mut Cost) {
        cost.metadata_expires += 1;
        if let Err(e) = self.store.expire(&self.store_key(key), ttl_minutes).await {
            cost.store_errors += 1;
            warn!(key = %key, error = %e, "Metadata expire failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use chrono::Utc;
    use ghcache_core::SchemaVersion;

    fn setup() -> (Arc<InMemoryStore>, MetadataStore) {
        let store = Arc::new(InMemoryStore::default());
        let metadata = MetadataStore::new(store.clone(), "test:");
        (store, metadata)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_store, metadata) = setup();
        let key = CacheKey::from_raw("orgRepos(org=contoso)");
        let record = MetadataRecord::new(Utc::now(), "\"v1\"", "hash", &SchemaVersion::new(&[2]));
        let mut cost = Cost::new();

        assert!(metadata.put(&key, &record, 60, &mut cost).await);
        assert_eq!(metadata.get(&key, &mut cost).await, Some(record));
        assert_eq!(cost.metadata_sets, 1);
        assert_eq!(cost.metadata_gets, 1);
    }

    #[tokio::test]
    async fn test_store_failure_reads_as_absent() {
        let (store, metadata) = setup();
        let key = CacheKey::from_raw("k()");
        let record = MetadataRecord::new(Utc::now(), "v", "hash", &SchemaVersion::new(&[2]));
        let mut cost = Cost::new();
        metadata.put(&key, &record, 60, &mut cost).await;

        store.set_failing(true);
        assert_eq!(metadata.get(&key, &mut cost).await, None);
        assert!(!metadata.put(&key, &record, 60, &mut cost).await);
        assert_eq!(cost.store_errors, 2);
    }

    #[tokio::test]
    async fn test_unreadable_record_is_absent() {
        let (store, metadata) = setup();
        let key = CacheKey::from_raw("k()");
        store
            .set_with_expire(&metadata.store_key(&key), b"{\"legacy\":true}", 60)
            .await
            .unwrap();

        let mut cost = Cost::new();
        assert_eq!(metadata.get(&key, &mut cost).await, None);
        assert_eq!(cost.store_errors, 0);
    }
}
