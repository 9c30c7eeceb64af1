//! Test doubles shared by the engine's unit tests.

use crate::engine::StalenessEngine;
use async_trait::async_trait;
use ghcache_core::{
    Clock, Cost, EngineConfig, Error, FetchOutcome, ManualClock, Page, PageFetcher,
    RemoteFetcher, Result, Revalidation,
};
use ghcache_store::{BodyStore, InMemoryStore, MetadataStore};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Engine over an in-memory store and a manual clock.
pub struct TestEngine {
    pub engine: StalenessEngine,
    pub store: Arc<InMemoryStore>,
    pub clock: ManualClock,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::build(false)
    }

    pub fn with_local_cache() -> Self {
        Self::build(true)
    }

    fn build(local: bool) -> Self {
        let clock = ManualClock::default();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(InMemoryStore::new(shared_clock.clone()));
        let mut builder = StalenessEngine::builder(store.clone())
            .config(EngineConfig::default())
            .clock(shared_clock);
        if local {
            builder = builder.with_local_cache();
        }
        let engine = builder.build().unwrap();
        Self {
            engine,
            store,
            clock,
        }
    }

    /// Another engine sharing this store and clock, as a second worker would.
    pub fn worker(&self) -> StalenessEngine {
        StalenessEngine::builder(self.store.clone())
            .config(self.engine.config().clone())
            .clock(self.engine.clock().clone())
            .build()
            .unwrap()
    }

    pub fn metadata(&self) -> MetadataStore {
        MetadataStore::new(self.store.clone(), self.engine.config().key_prefix.clone())
    }

    pub fn bodies(&self) -> BodyStore {
        BodyStore::new(
            self.store.clone(),
            self.engine.config().key_prefix.clone(),
            self.engine.config().compression,
        )
    }
}

/// Fetcher answering from a fixed script, recording the validator of each call.
pub struct Script {
    responses: Mutex<VecDeque<Result<FetchOutcome>>>,
    validators: Mutex<Vec<Option<String>>>,
}

impl Script {
    pub fn new(responses: Vec<Result<FetchOutcome>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            validators: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.validators.lock().unwrap().len()
    }

    pub fn validators(&self) -> Vec<Option<String>> {
        self.validators.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteFetcher for Script {
    async fn fetch(
        &self,
        revalidate: Option<Revalidation<'_>>,
        cost: &mut Cost,
    ) -> Result<FetchOutcome> {
        self.validators
            .lock()
            .unwrap()
            .push(revalidate.map(|r| r.validator.to_string()));
        let outcome = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Internal("script exhausted".into())))?;
        outcome.charge(cost);
        Ok(outcome)
    }
}

/// Page fetcher answering from a fixed script of pages.
pub struct PageScript {
    responses: Mutex<VecDeque<Result<Page>>>,
    requests: Mutex<Vec<(u32, Option<String>)>>,
}

impl PageScript {
    pub fn new(responses: Vec<Result<Page>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<(u32, Option<String>)> {
        self.requests.lock().unwrap().clone()
    }

    /// Queue more pages after the initial script.
    pub fn push(&self, responses: Vec<Result<Page>>) {
        self.responses.lock().unwrap().extend(responses);
    }
}

#[async_trait]
impl PageFetcher for PageScript {
    async fn fetch_page(
        &self,
        page: u32,
        validator: Option<&str>,
        cost: &mut Cost,
    ) -> Result<Page> {
        self.requests
            .lock()
            .unwrap()
            .push((page, validator.map(str::to_string)));
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Internal("page script exhausted".into())))?;
        next.outcome.charge(cost);
        Ok(next)
    }
}

/// Fetcher that panics on every call.
pub struct Panicking;

#[async_trait]
impl RemoteFetcher for Panicking {
    async fn fetch(
        &self,
        _revalidate: Option<Revalidation<'_>>,
        _cost: &mut Cost,
    ) -> Result<FetchOutcome> {
        panic!("fetcher panicked");
    }
}
