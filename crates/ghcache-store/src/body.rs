//! Versioned body record store.

use crate::compression::{decode_body, encode_body};
use ghcache_core::{CacheKey, CompressionType, Cost, SharedStore};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;

/// Typed view of compressed payloads in the shared store.
///
/// Bodies are keyed by cache key plus validator, so two versions of one
/// resource can coexist while late readers finish with the older one.
#[derive(Clone)]
pub struct BodyStore {
    store: Arc<dyn SharedStore>,
    prefix: String,
    compression: CompressionType,
}

impl BodyStore {
    pub fn new(
        store: Arc<dyn SharedStore>,
        prefix: impl Into<String>,
        compression: CompressionType,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            compression,
        }
    }

    /// Shared store key holding the body of `key` at `validator`.
    pub fn store_key(&self, key: &CacheKey, validator: &str) -> String {
        let digest = Sha256::digest(validator.as_bytes());
        format!("{}body:{}:{}", self.prefix, key, hex::encode(&digest[..8]))
    }

    /// Load and decode a body, treating any failure as a miss.
    pub async fn get(&self, key: &CacheKey, validator: &str, cost: &mut Cost) -> Option<Value> {
        let bytes = match self.store.get(&self.store_key(key, validator)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                cost.body_misses += 1;
                return None;
            }
            Err(e) => {
                cost.body_misses += 1;
                cost.store_errors += 1;
                warn!(key = %key, error = %e, "Body read failed, treating as uncached");
                return None;
            }
        };

        match decode_body(&bytes) {
            Ok(payload) => {
                cost.body_hits += 1;
                Some(payload)
            }
            Err(e) => {
                cost.body_misses += 1;
                warn!(key = %key, error = %e, "Corrupt body record ignored");
                None
            }
        }
    }

    /// Compress and write a body. Returns whether the write succeeded.
    pub async fn put(
        &self,
        key: &CacheKey,
        validator: &str,
        payload: &Value,
        ttl_minutes: u64,
        cost: &mut Cost,
    ) -> bool {
        let bytes = match encode_body(payload, self.compression) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Body could not be encoded");
                return false;
            }
        };

        cost.body_sets += 1;
        match self
            .store
            .set_with_expire(&self.store_key(key, validator), &bytes, ttl_minutes)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                cost.store_errors += 1;
                warn!(key = %key, error = %e, "Body write failed");
                false
            }
        }
    }

    /// Reset the expiry of a body, extending or shortening it.
    pub async fn expire(&self, key: &CacheKey, validator: &str, ttl_minutes: u64, cost: &mut Cost) {
        cost.body_expires += 1;
        if let Err(e) = self
            .store
            .expire(&self.store_key(key, validator), ttl_minutes)
            .await
        {
            cost.store_errors += 1;
            warn!(key = %key, error = %e, "Body expire failed");
        }
    }
}
