//! Staleness engine.
//!
//! Decides, per call, whether a cached value can be served as-is, served
//! while a background refresh runs, or must be revalidated with the remote
//! first, then reconciles the remote's answer with the shared store.

use crate::policy::{CachePolicy, Decision};
use crate::refresh::{RefreshTracker, claim_window};
use chrono::{DateTime, Utc};
use ghcache_core::{
    CacheKey, Clock, Cost, EngineConfig, Error, FetchOutcome, Fetched, MetadataRecord,
    RemoteFetcher, ResponseMeta, Result, Revalidation, SchemaVersion, SharedStore, SystemClock,
    content_hash,
};
use ghcache_store::{BodyStore, LocalCache, MetadataStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a resolved value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Served from cache within its freshness window.
    CachedFresh,
    /// Served stale from cache; a background refresh may be running.
    CachedStale,
    /// The remote confirmed the cached value is still current.
    Revalidated,
    /// New content was fetched and persisted.
    Fetched,
}

/// A value returned by the engine together with what it cost.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub value: Arc<Value>,
    pub cost: Cost,
    pub outcome: Outcome,
    pub validator: String,
    pub updated: DateTime<Utc>,
    pub changed: DateTime<Utc>,
}

impl Resolved {
    fn new(value: Arc<Value>, record: &MetadataRecord, outcome: Outcome, cost: Cost) -> Self {
        Self {
            value,
            cost,
            outcome,
            validator: record.validator.clone(),
            updated: record.updated,
            changed: record.changed,
        }
    }

    /// Whether the value came from the cache without a remote call.
    pub fn is_cached(&self) -> bool {
        matches!(self.outcome, Outcome::CachedFresh | Outcome::CachedStale)
    }
}

struct EngineInner {
    config: EngineConfig,
    schema: SchemaVersion,
    minimum: SchemaVersion,
    metadata: MetadataStore,
    bodies: BodyStore,
    local: Option<Arc<LocalCache>>,
    clock: Arc<dyn Clock>,
    refreshes: RefreshTracker,
}

/// Builder for [`StalenessEngine`].
pub struct EngineBuilder {
    store: Arc<dyn SharedStore>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    local: Option<Arc<LocalCache>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach a local ephemeral cache, possibly shared with other engines.
    pub fn local_cache(mut self, cache: Arc<LocalCache>) -> Self {
        self.local = Some(cache);
        self
    }

    /// Attach a private local cache sized by `local_cache_capacity`.
    pub fn with_local_cache(self) -> Self {
        let capacity = self.config.local_cache_capacity;
        self.local_cache(Arc::new(LocalCache::new(capacity)))
    }

    pub fn build(self) -> Result<StalenessEngine> {
        self.config.validate()?;
        let schema = self.config.current_schema()?;
        let minimum = self.config.minimum_schema()?;
        let metadata = MetadataStore::new(self.store.clone(), self.config.key_prefix.clone());
        let bodies = BodyStore::new(
            self.store,
            self.config.key_prefix.clone(),
            self.config.compression,
        );

        Ok(StalenessEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                schema,
                minimum,
                metadata,
                bodies,
                local: self.local,
                clock: self.clock,
                refreshes: RefreshTracker::default(),
            }),
        })
    }
}

/// Cache-aside engine over a shared store.
///
/// Cloning is cheap; clones share stores, clock and refresh bookkeeping.
#[derive(Clone)]
pub struct StalenessEngine {
    inner: Arc<EngineInner>,
}

impl StalenessEngine {
    pub fn builder(store: Arc<dyn SharedStore>) -> EngineBuilder {
        EngineBuilder {
            store,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            local: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn local_cache(&self) -> Option<&Arc<LocalCache>> {
        self.inner.local.as_ref()
    }

    /// Resolve `key` according to `policy`, calling `fetcher` when needed.
    ///
    /// Remote failures on the synchronous path propagate. Shared store
    /// failures degrade to a remote fetch.
    pub async fn resolve(
        &self,
        key: &CacheKey,
        fetcher: Arc<dyn RemoteFetcher>,
        policy: CachePolicy,
    ) -> Result<Resolved> {
        let mut cost = Cost::new();
        let now = self.inner.clock.now();

        let Some(meta) = self.load_metadata(key, &mut cost).await else {
            debug!(key = %key, "Uncached, fetching");
            return self.fetch_and_persist(key, fetcher.as_ref(), None, cost).await;
        };

        let Some(cached) = self.load_body(key, &meta, &mut cost).await else {
            debug!(key = %key, validator = %meta.validator, "Body missing, fetching");
            return self
                .fetch_and_persist(key, fetcher.as_ref(), Some(meta), cost)
                .await;
        };

        match policy.decide(&meta, now) {
            Decision::Serve => {
                cost.remote_avoided += 1;
                debug!(key = %key, "Fresh hit");
                Ok(Resolved::new(cached, &meta, Outcome::CachedFresh, cost))
            }
            Decision::ServeAndRefresh => {
                cost.remote_avoided += 1;
                debug!(key = %key, "Stale hit, refreshing in background");
                self.schedule_refresh(key, fetcher, &meta, now, &mut cost);
                Ok(Resolved::new(cached, &meta, Outcome::CachedStale, cost))
            }
            Decision::Revalidate => {
                debug!(key = %key, validator = %meta.validator, "Stale hit, revalidating");
                self.revalidate(key, fetcher.as_ref(), meta, cached, cost).await
            }
        }
    }

    /// [`resolve`](Self::resolve), returning only the value and its cost.
    pub async fn resolve_value(
        &self,
        key: &CacheKey,
        fetcher: Arc<dyn RemoteFetcher>,
        policy: CachePolicy,
    ) -> Result<(Arc<Value>, Cost)> {
        let resolved = self.resolve(key, fetcher, policy).await?;
        Ok((resolved.value, resolved.cost))
    }

    /// Number of background refreshes started by this engine still running.
    pub fn refresh_tasks(&self) -> usize {
        self.inner.refreshes.pending()
    }

    /// Wait for every background refresh started so far.
    pub async fn wait_for_refreshes(&self) {
        loop {
            let handles = self.inner.refreshes.drain();
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Background refresh task aborted");
                }
            }
        }
    }

    async fn load_metadata(&self, key: &CacheKey, cost: &mut Cost) -> Option<MetadataRecord> {
        let meta = self.inner.metadata.get(key, cost).await?;
        if !meta.is_compatible(&self.inner.minimum) {
            debug!(
                key = %key,
                schema_version = %meta.schema_version,
                minimum = %self.inner.minimum,
                "Incompatible metadata ignored"
            );
            return None;
        }
        Some(meta)
    }

    async fn load_body(
        &self,
        key: &CacheKey,
        meta: &MetadataRecord,
        cost: &mut Cost,
    ) -> Option<Arc<Value>> {
        if let Some(local) = &self.inner.local {
            if let Some(value) = local.get(key, &meta.validator).await {
                cost.local_hits += 1;
                return Some(value);
            }
            cost.local_misses += 1;
        }

        let value = Arc::new(self.inner.bodies.get(key, &meta.validator, cost).await?);
        if let Some(local) = &self.inner.local {
            local.insert(key, &meta.validator, value.clone()).await;
        }
        Some(value)
    }

    async fn fetch_and_persist(
        &self,
        key: &CacheKey,
        fetcher: &dyn RemoteFetcher,
        prior: Option<MetadataRecord>,
        mut cost: Cost,
    ) -> Result<Resolved> {
        match fetcher.fetch(None, &mut cost).await? {
            FetchOutcome::Modified(fetched) => {
                let (value, record) = self.persist(key, fetched, prior.as_ref(), &mut cost).await;
                Ok(Resolved::new(value, &record, Outcome::Fetched, cost))
            }
            FetchOutcome::NotModified(_) => Err(Error::InvalidPayload(format!(
                "remote answered not modified to an unconditional fetch of {}",
                key
            ))),
        }
    }

    async fn revalidate(
        &self,
        key: &CacheKey,
        fetcher: &dyn RemoteFetcher,
        meta: MetadataRecord,
        cached: Arc<Value>,
        mut cost: Cost,
    ) -> Result<Resolved> {
        let revalidation = Revalidation {
            validator: &meta.validator,
            page_validators: &meta.page_validators,
            cached: &cached,
        };

        match fetcher.fetch(Some(revalidation), &mut cost).await? {
            FetchOutcome::NotModified(response) => {
                cost.remote_avoided += 1;
                let record = self.confirm(key, &meta, &response, &mut cost).await;
                debug!(key = %key, validator = %record.validator, "Not modified");
                Ok(Resolved::new(cached, &record, Outcome::Revalidated, cost))
            }
            FetchOutcome::Modified(fetched) => {
                let (value, record) = self.persist(key, fetched, Some(&meta), &mut cost).await;
                Ok(Resolved::new(value, &record, Outcome::Fetched, cost))
            }
        }
    }

    /// Record that the cached version was confirmed current.
    ///
    /// The body is only re-expired, never rewritten.
    async fn confirm(
        &self,
        key: &CacheKey,
        meta: &MetadataRecord,
        response: &ResponseMeta,
        cost: &mut Cost,
    ) -> MetadataRecord {
        let retention = self.inner.config.retention_minutes;
        let mut record = meta.without_claim();
        record.updated = self.inner.clock.now();
        if response.rate_limit_remaining.is_some() {
            record.rate_limit_remaining = response.rate_limit_remaining;
        }

        self.inner.metadata.put(key, &record, retention, cost).await;
        self.inner
            .bodies
            .expire(key, &record.validator, retention, cost)
            .await;
        record
    }

    /// Write new content: body first, then metadata, then shorten the
    /// superseded body.
    async fn persist(
        &self,
        key: &CacheKey,
        fetched: Fetched,
        prior: Option<&MetadataRecord>,
        cost: &mut Cost,
    ) -> (Arc<Value>, MetadataRecord) {
        let Fetched {
            payload,
            validator,
            page_validators,
            meta,
        } = fetched;
        let config = &self.inner.config;
        let now = self.inner.clock.now();

        let mut record =
            MetadataRecord::new(now, validator, content_hash(&payload), &self.inner.schema);
        record.page_validators = page_validators;
        record.rate_limit_remaining = meta.rate_limit_remaining;
        if let Some(prior) = prior {
            if prior.content_hash == record.content_hash {
                record.changed = prior.changed;
            }
        }

        let body_written = self
            .inner
            .bodies
            .put(key, &record.validator, &payload, config.retention_minutes, cost)
            .await;
        if body_written {
            self.inner
                .metadata
                .put(key, &record, config.retention_minutes, cost)
                .await;
            if let Some(prior) = prior.filter(|p| p.validator != record.validator) {
                self.inner
                    .bodies
                    .expire(key, &prior.validator, config.superseded_body_minutes, cost)
                    .await;
            }
        } else {
            warn!(key = %key, "Body not stored, leaving metadata untouched");
        }

        let value = Arc::new(payload);
        if let Some(local) = &self.inner.local {
            local.insert(key, &record.validator, value.clone()).await;
        }

        info!(
            key = %key,
            validator = %record.validator,
            changed = record.changed == now,
            pages = record.pages(),
            "Persisted fetched content"
        );
        (value, record)
    }

    fn schedule_refresh(
        &self,
        key: &CacheKey,
        fetcher: Arc<dyn RemoteFetcher>,
        meta: &MetadataRecord,
        now: DateTime<Utc>,
        cost: &mut Cost,
    ) {
        let window = claim_window(&self.inner.config, meta.pages());
        if meta.has_live_claim(now, window) {
            cost.background_skipped += 1;
            debug!(key = %key, refresh_id = ?meta.refresh_id, "Refresh already claimed");
            return;
        }
        let Some(in_flight) = self.inner.refreshes.try_begin(key) else {
            cost.background_skipped += 1;
            debug!(key = %key, "Refresh already running in this process");
            return;
        };

        cost.background_refreshes += 1;
        let engine = self.clone();
        let key = key.clone();
        let meta = meta.clone();
        let handle = tokio::spawn(async move {
            let _in_flight = in_flight;
            engine.refresh(&key, fetcher.as_ref(), &meta).await;
        });
        self.inner.refreshes.track(handle);
    }

    /// Claim, settle, confirm the claim, then revalidate.
    ///
    /// `seen` is the record the stale hit was served from. The claim is only
    /// written on top of that same version, so a newer version persisted by
    /// another worker is never rolled back. The claim is released on every
    /// completion that did not already overwrite it.
    async fn refresh(&self, key: &CacheKey, fetcher: &dyn RemoteFetcher, seen: &MetadataRecord) {
        let mut cost = Cost::new();
        let retention = self.inner.config.retention_minutes;
        let claim_id = Uuid::new_v4().to_string();
        let now = self.inner.clock.now();

        let Some(latest) = self.load_metadata(key, &mut cost).await else {
            debug!(key = %key, "Metadata vanished before claim");
            return;
        };
        if latest.validator != seen.validator || latest.updated != seen.updated {
            debug!(
                key = %key,
                seen = %seen.validator,
                latest = %latest.validator,
                "Metadata replaced since the stale read, skipping refresh"
            );
            return;
        }
        if latest.has_live_claim(now, claim_window(&self.inner.config, latest.pages())) {
            debug!(key = %key, refresh_id = ?latest.refresh_id, "Refresh claimed meanwhile");
            return;
        }

        let claimed = latest.with_claim(now, claim_id.as_str());
        if !self
            .inner
            .metadata
            .put(key, &claimed, retention, &mut cost)
            .await
        {
            warn!(key = %key, "Could not write refresh claim, skipping refresh");
            return;
        }

        tokio::time::sleep(self.inner.config.settle_delay()).await;

        let Some(current) = self.load_metadata(key, &mut cost).await else {
            debug!(key = %key, "Metadata vanished before refresh");
            return;
        };
        if !current.is_claimed_by(&claim_id) {
            debug!(key = %key, refresh_id = %claim_id, "Refresh claim taken over by another worker");
            return;
        }

        let result = match self.load_body(key, &current, &mut cost).await {
            Some(cached) => {
                self.revalidate(key, fetcher, current.clone(), cached, cost)
                    .await
            }
            None => {
                self.fetch_and_persist(key, fetcher, Some(current.clone()), cost)
                    .await
            }
        };

        match result {
            Ok(resolved) => info!(
                key = %key,
                outcome = ?resolved.outcome,
                remote_calls = resolved.cost.remote_calls,
                "Background refresh complete"
            ),
            Err(e) => warn!(key = %key, error = %e, "Background refresh failed"),
        }
        // A skipped metadata write (body not stored) leaves the claim behind.
        self.release_claim(key, &claim_id).await;
    }

    async fn release_claim(&self, key: &CacheKey, claim_id: &str) {
        let mut cost = Cost::new();
        let Some(current) = self.load_metadata(key, &mut cost).await else {
            return;
        };
        if current.is_claimed_by(claim_id) {
            self.inner
                .metadata
                .put(
                    key,
                    &current.without_claim(),
                    self.inner.config.retention_minutes,
                    &mut cost,
                )
                .await;
        }
    }
}
