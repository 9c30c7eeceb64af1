//! Test helper functions and utilities.

use async_trait::async_trait;
use ghcache_core::{
    Clock, Cost, EngineConfig, Error, FetchOutcome, ManualClock, MetadataRecord, Page,
    PageFetcher, RemoteFetcher, Result, Revalidation, SharedStore,
};
use ghcache_engine::StalenessEngine;
use ghcache_github::{GitHubClient, GitHubConfig};
use ghcache_store::InMemoryStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// An engine over an in-memory shared store with a manual clock.
///
/// Extra workers created with [`Harness::worker`] share the store and the
/// clock but keep their own refresh bookkeeping, like separate processes.
pub struct Harness {
    pub engine: StalenessEngine,
    pub store: Arc<InMemoryStore>,
    pub clock: ManualClock,
    config: EngineConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        crate::init_test_logging();

        let clock = ManualClock::default();
        let store = Arc::new(InMemoryStore::new(Arc::new(clock.clone())));
        let engine = Self::build(&store, &clock, config.clone());
        Self {
            engine,
            store,
            clock,
            config,
        }
    }

    fn build(store: &Arc<InMemoryStore>, clock: &ManualClock, config: EngineConfig) -> StalenessEngine {
        let clock: Arc<dyn Clock> = Arc::new(clock.clone());
        StalenessEngine::builder(store.clone())
            .config(config)
            .clock(clock)
            .build()
            .expect("Failed to build engine")
    }

    /// Another worker over the same store.
    pub fn worker(&self) -> StalenessEngine {
        Self::build(&self.store, &self.clock, self.config.clone())
    }

    /// Another worker over the same store with a different configuration.
    pub fn worker_with(&self, config: EngineConfig) -> StalenessEngine {
        Self::build(&self.store, &self.clock, config)
    }

    fn meta_key(&self, key: &ghcache_core::CacheKey) -> String {
        format!("{}meta:{}", self.config.key_prefix, key)
    }

    /// Read the raw metadata record for `key`.
    pub async fn metadata(&self, key: &ghcache_core::CacheKey) -> Option<MetadataRecord> {
        let bytes = self.store.get(&self.meta_key(key)).await.ok()??;
        serde_json::from_slice(&bytes).ok()
    }

    /// Overwrite the metadata record for `key`.
    pub async fn put_metadata(&self, key: &ghcache_core::CacheKey, record: &MetadataRecord) {
        let bytes = serde_json::to_vec(record).expect("Failed to serialize record");
        self.store
            .set_with_expire(&self.meta_key(key), &bytes, self.config.retention_minutes)
            .await
            .expect("Failed to write record");
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A remote double answering from a fixed script.
///
/// Records the validator sent with every call. Once the script runs out,
/// every call fails.
pub struct ScriptedFetcher {
    responses: Mutex<VecDeque<Result<FetchOutcome>>>,
    validators: Mutex<Vec<Option<String>>>,
    latency: Duration,
}

impl ScriptedFetcher {
    pub fn new(responses: Vec<Result<FetchOutcome>>) -> Arc<Self> {
        Self::with_latency(responses, Duration::ZERO)
    }

    /// Like [`new`](Self::new), sleeping `latency` on tokio time per call.
    pub fn with_latency(responses: Vec<Result<FetchOutcome>>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            validators: Mutex::new(Vec::new()),
            latency,
        })
    }

    pub fn push(&self, response: Result<FetchOutcome>) {
        lock(&self.responses).push_back(response);
    }

    pub fn calls(&self) -> usize {
        lock(&self.validators).len()
    }

    pub fn validators(&self) -> Vec<Option<String>> {
        lock(&self.validators).clone()
    }
}

#[async_trait]
impl RemoteFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        revalidate: Option<Revalidation<'_>>,
        cost: &mut Cost,
    ) -> Result<FetchOutcome> {
        lock(&self.validators).push(revalidate.map(|r| r.validator.to_string()));
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let next = lock(&self.responses).pop_front();
        let outcome = next.unwrap_or_else(|| Err(Error::Internal("script exhausted".into())))?;
        outcome.charge(cost);
        Ok(outcome)
    }
}

/// A paginated remote double answering from a fixed script of pages.
pub struct ScriptedPages {
    responses: Mutex<VecDeque<Result<Page>>>,
    requests: Mutex<Vec<(u32, Option<String>)>>,
}

impl ScriptedPages {
    pub fn new(responses: Vec<Result<Page>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, response: Result<Page>) {
        lock(&self.responses).push_back(response);
    }

    pub fn requests(&self) -> Vec<(u32, Option<String>)> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedPages {
    async fn fetch_page(
        &self,
        page: u32,
        validator: Option<&str>,
        cost: &mut Cost,
    ) -> Result<Page> {
        lock(&self.requests).push((page, validator.map(str::to_string)));
        let next = lock(&self.responses).pop_front();
        let page = next.unwrap_or_else(|| Err(Error::Internal("page script exhausted".into())))?;
        page.outcome.charge(cost);
        Ok(page)
    }
}

/// GitHub client pointed at a mock server.
pub fn github_client(base_url: &str) -> GitHubClient {
    GitHubClient::new(GitHubConfig::default().with_base_url(base_url))
        .expect("Failed to create GitHub client")
}
