//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the caching engine and its
//! external adapters: the shared key-value store and the remote API.

use crate::Result;
use crate::cost::Cost;
use crate::record::PageValidator;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Shared key-value store used as the coordination medium between workers.
///
/// "Not found" is `Ok(None)`; errors are reserved for store failures.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Get the raw bytes stored under a key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes under a key with an expiry.
    async fn set_with_expire(&self, key: &str, value: &[u8], ttl_minutes: u64) -> Result<()>;

    /// Reset the expiry of an existing key.
    async fn expire(&self, key: &str, ttl_minutes: u64) -> Result<()>;
}

/// Response metadata that accompanies both fresh and not-modified responses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// Remaining rate-limit budget reported by the remote.
    pub rate_limit_remaining: Option<u64>,
    /// Delay the remote asked for before the next request.
    pub retry_after: Option<Duration>,
}

impl ResponseMeta {
    /// Charge one remote call with this metadata to `cost`.
    pub fn charge(&self, cost: &mut Cost, not_modified: bool) {
        cost.remote_calls += 1;
        if not_modified {
            cost.remote_not_modified += 1;
        }
        if let Some(remaining) = self.rate_limit_remaining {
            cost.observe_rate_limit(remaining);
        }
    }
}

/// A full payload returned by the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub payload: Value,
    pub validator: String,
    /// Per-page validators when the payload is a concatenated collection.
    pub page_validators: Vec<PageValidator>,
    pub meta: ResponseMeta,
}

impl Fetched {
    pub fn new(payload: Value, validator: impl Into<String>) -> Self {
        Self {
            payload,
            validator: validator.into(),
            page_validators: Vec::new(),
            meta: ResponseMeta::default(),
        }
    }

    pub fn with_rate_limit(mut self, remaining: u64) -> Self {
        self.meta.rate_limit_remaining = Some(remaining);
        self
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.meta.retry_after = Some(delay);
        self
    }

    pub fn with_page_validators(mut self, pages: Vec<PageValidator>) -> Self {
        self.page_validators = pages;
        self
    }
}

/// Result of one conditional remote fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The cached version is still current.
    NotModified(ResponseMeta),
    /// The remote returned new content.
    Modified(Fetched),
}

impl FetchOutcome {
    pub fn not_modified() -> Self {
        FetchOutcome::NotModified(ResponseMeta::default())
    }

    pub fn modified(payload: Value, validator: impl Into<String>) -> Self {
        FetchOutcome::Modified(Fetched::new(payload, validator))
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self, FetchOutcome::NotModified(_))
    }

    pub fn meta(&self) -> &ResponseMeta {
        match self {
            FetchOutcome::NotModified(meta) => meta,
            FetchOutcome::Modified(fetched) => &fetched.meta,
        }
    }

    /// Charge this outcome as a single remote call.
    pub fn charge(&self, cost: &mut Cost) {
        self.meta().charge(cost, self.is_not_modified());
    }
}

/// What the engine currently holds for a key, offered to a fetcher so it can
/// issue a conditional request.
#[derive(Debug, Clone, Copy)]
pub struct Revalidation<'a> {
    pub validator: &'a str,
    pub page_validators: &'a [PageValidator],
    pub cached: &'a Value,
}

/// One remote operation, performed with an optional validator hint.
///
/// Implementations must be idempotent and charge every remote call they
/// make to `cost`.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(
        &self,
        revalidate: Option<Revalidation<'_>>,
        cost: &mut Cost,
    ) -> Result<FetchOutcome>;
}

/// One page of a collection endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub outcome: FetchOutcome,
    /// Whether the remote advertised a further page; `None` when unknown.
    pub has_next: Option<bool>,
}

impl Page {
    pub fn new(outcome: FetchOutcome, has_next: bool) -> Self {
        Self {
            outcome,
            has_next: Some(has_next),
        }
    }
}

/// Fetches numbered pages (starting at 1) of a collection endpoint.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, page: u32, validator: Option<&str>, cost: &mut Cost)
    -> Result<Page>;
}
