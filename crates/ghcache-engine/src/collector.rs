//! Multi-page collection support.
//!
//! A collection is cached as one concatenated array under a single key.
//! [`CollectionFetcher`] walks the pages and revalidates each one with the
//! validator recorded for it, so unchanged pages cost a not-modified
//! response instead of a full body.

use crate::engine::{Resolved, StalenessEngine};
use crate::policy::CachePolicy;
use async_trait::async_trait;
use ghcache_core::{
    CacheKey, Cost, Error, FetchOutcome, Fetched, Page, PageFetcher, PageValidator,
    RemoteFetcher, ResponseMeta, Result, Revalidation,
};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Validator of a whole collection, derived from its page validators.
pub fn composite_validator(pages: &[PageValidator]) -> String {
    let mut hasher = Sha256::new();
    for page in pages {
        hasher.update(page.validator.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Previously cached pages, usable only if the recorded item counts still
/// add up to the cached array.
struct PriorPages<'a> {
    pages: &'a [PageValidator],
    items: &'a [Value],
}

impl<'a> PriorPages<'a> {
    fn from_revalidation(revalidation: Revalidation<'a>) -> Option<Self> {
        let items = revalidation.cached.as_array()?;
        let pages = revalidation.page_validators;
        let recorded: usize = pages.iter().map(|p| p.items).sum();
        if pages.is_empty() || recorded != items.len() {
            return None;
        }
        Some(Self { pages, items })
    }

    /// Validator and cached items of page `page` (1-based).
    fn page(&self, page: u32) -> Option<(&'a PageValidator, &'a [Value])> {
        let index = page.checked_sub(1)? as usize;
        let validator = self.pages.get(index)?;
        let offset: usize = self.pages[..index].iter().map(|p| p.items).sum();
        Some((validator, &self.items[offset..offset + validator.items]))
    }
}

/// [`RemoteFetcher`] that collects every page of a collection endpoint.
///
/// A rate-limited page is retried after the delay the remote asked for, up
/// to `rate_limit_retries` times. Any other page error aborts the whole
/// collection.
pub struct CollectionFetcher {
    pages: Arc<dyn PageFetcher>,
    page_limit: u32,
    rate_limit_retries: u32,
}

impl CollectionFetcher {
    /// Collect at most `page_limit` pages (at least one).
    pub fn new(pages: Arc<dyn PageFetcher>, page_limit: u32) -> Self {
        Self {
            pages,
            page_limit: page_limit.max(1),
            rate_limit_retries: 3,
        }
    }

    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    async fn fetch_with_retry(
        &self,
        page: u32,
        validator: Option<&str>,
        cost: &mut Cost,
    ) -> Result<Page> {
        let mut attempt = 0;
        loop {
            match self.pages.fetch_page(page, validator, cost).await {
                Err(e) if attempt < self.rate_limit_retries => {
                    let Some(delay) = e.retry_after() else {
                        return Err(e);
                    };
                    attempt += 1;
                    debug!(
                        page,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Rate limited, retrying page"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait]
impl RemoteFetcher for CollectionFetcher {
    async fn fetch(
        &self,
        revalidate: Option<Revalidation<'_>>,
        cost: &mut Cost,
    ) -> Result<FetchOutcome> {
        let prior = revalidate.and_then(PriorPages::from_revalidation);
        let mut items: Vec<Value> = Vec::new();
        let mut pages: Vec<PageValidator> = Vec::new();
        let mut unchanged = true;
        let mut rate_limit: Option<u64> = None;
        let mut page_no = 1u32;

        loop {
            let cached = prior.as_ref().and_then(|p| p.page(page_no));
            let page = self
                .fetch_with_retry(page_no, cached.map(|(v, _)| v.validator.as_str()), cost)
                .await
                .map_err(|e| e.on_page(page_no))?;

            let meta = page.outcome.meta().clone();
            if let Some(remaining) = meta.rate_limit_remaining {
                rate_limit = Some(rate_limit.map_or(remaining, |r| r.min(remaining)));
            }

            let has_next = match page.outcome {
                FetchOutcome::NotModified(_) => {
                    let Some((validator, page_items)) = cached else {
                        return Err(Error::InvalidPayload(
                            "not modified without a cached page".into(),
                        )
                        .on_page(page_no));
                    };
                    items.extend_from_slice(page_items);
                    pages.push(validator.clone());
                    let known_pages = prior.as_ref().map_or(0, |p| p.pages.len());
                    page.has_next.unwrap_or((page_no as usize) < known_pages)
                }
                FetchOutcome::Modified(fetched) => {
                    unchanged = false;
                    let Value::Array(page_items) = fetched.payload else {
                        return Err(Error::InvalidPayload("page is not a JSON array".into())
                            .on_page(page_no));
                    };
                    pages.push(PageValidator::new(fetched.validator, page_items.len()));
                    items.extend(page_items);
                    page.has_next.unwrap_or(false)
                }
            };

            if !has_next || page_no >= self.page_limit {
                break;
            }
            if let Some(delay) = meta.retry_after {
                debug!(page = page_no, delay_ms = delay.as_millis() as u64, "Backing off before next page");
                tokio::time::sleep(delay).await;
            }
            page_no += 1;
        }

        let same_shape = prior.as_ref().is_some_and(|p| p.pages.len() == pages.len());
        if unchanged && same_shape {
            return Ok(FetchOutcome::NotModified(ResponseMeta {
                rate_limit_remaining: rate_limit,
                retry_after: None,
            }));
        }

        let validator = composite_validator(&pages);
        let mut fetched = Fetched::new(Value::Array(items), validator).with_page_validators(pages);
        fetched.meta.rate_limit_remaining = rate_limit;
        Ok(FetchOutcome::Modified(fetched))
    }
}

/// Collects paginated endpoints through the engine.
#[derive(Clone)]
pub struct PaginationCollector {
    engine: StalenessEngine,
}

impl PaginationCollector {
    pub fn new(engine: StalenessEngine) -> Self {
        Self { engine }
    }

    /// Concatenate up to `page_limit` pages, cached under `key`.
    pub async fn collect_all(
        &self,
        key: &CacheKey,
        pages: Arc<dyn PageFetcher>,
        page_limit: u32,
        policy: CachePolicy,
    ) -> Result<(Arc<Value>, Cost)> {
        let resolved = self.collect(key, pages, page_limit, policy).await?;
        Ok((resolved.value, resolved.cost))
    }

    /// Like [`collect_all`](Self::collect_all), keeping the full resolution.
    pub async fn collect(
        &self,
        key: &CacheKey,
        pages: Arc<dyn PageFetcher>,
        page_limit: u32,
        policy: CachePolicy,
    ) -> Result<Resolved> {
        let fetcher = Arc::new(
            CollectionFetcher::new(pages, page_limit)
                .with_rate_limit_retries(self.engine.config().rate_limit_retries),
        );
        self.engine.resolve(key, fetcher, policy).await
    }
}
