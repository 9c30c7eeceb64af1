//! Closure adapters for the fetcher ports.

use async_trait::async_trait;
use ghcache_core::{Cost, FetchOutcome, Page, PageFetcher, RemoteFetcher, Result, Revalidation};
use std::future::Future;

/// [`RemoteFetcher`] backed by an async closure taking the validator hint.
///
/// Every successful call is charged to the cost as one remote call.
pub struct FnFetcher<F> {
    f: F,
}

impl<F> FnFetcher<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> RemoteFetcher for FnFetcher<F>
where
    F: Fn(Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<FetchOutcome>> + Send,
{
    async fn fetch(
        &self,
        revalidate: Option<Revalidation<'_>>,
        cost: &mut Cost,
    ) -> Result<FetchOutcome> {
        let validator = revalidate.map(|r| r.validator.to_string());
        let outcome = (self.f)(validator).await?;
        outcome.charge(cost);
        Ok(outcome)
    }
}

/// [`PageFetcher`] backed by an async closure taking the page number and
/// that page's validator hint.
pub struct FnPageFetcher<F> {
    f: F,
}

impl<F> FnPageFetcher<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> PageFetcher for FnPageFetcher<F>
where
    F: Fn(u32, Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Page>> + Send,
{
    async fn fetch_page(
        &self,
        page: u32,
        validator: Option<&str>,
        cost: &mut Cost,
    ) -> Result<Page> {
        let page = (self.f)(page, validator.map(str::to_string)).await?;
        page.outcome.charge(cost);
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_fetcher_charges_cost() {
        let fetcher = FnFetcher::new(|validator: Option<String>| async move {
            Ok(match validator {
                Some(_) => FetchOutcome::not_modified(),
                None => FetchOutcome::modified(json!(1), "\"v1\""),
            })
        });

        let mut cost = Cost::new();
        let first = fetcher.fetch(None, &mut cost).await.unwrap();
        assert!(!first.is_not_modified());

        let cached = json!(1);
        let revalidation = Revalidation {
            validator: "\"v1\"",
            page_validators: &[],
            cached: &cached,
        };
        let second = fetcher.fetch(Some(revalidation), &mut cost).await.unwrap();
        assert!(second.is_not_modified());
        assert_eq!(cost.remote_calls, 2);
        assert_eq!(cost.remote_not_modified, 1);
    }

    #[tokio::test]
    async fn test_fn_page_fetcher_passes_page_number() {
        let fetcher = FnPageFetcher::new(|page: u32, _validator: Option<String>| async move {
            Ok(Page::new(
                FetchOutcome::modified(json!([page]), format!("\"p{}\"", page)),
                page < 2,
            ))
        });

        let mut cost = Cost::new();
        let page = fetcher.fetch_page(2, None, &mut cost).await.unwrap();
        assert_eq!(page.has_next, Some(false));
        assert_eq!(cost.remote_calls, 1);
    }
}
