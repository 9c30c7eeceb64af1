//! GitHub REST adapter for ghcache.
//!
//! [`RestFetcher`] and [`RestPageFetcher`] turn GitHub endpoints into the
//! engine's fetcher ports, using ETags for conditional requests and the
//! `Link` header for pagination.

pub mod client;
pub mod config;
pub mod fetcher;

pub use client::{GitHubClient, RestResponse, has_next_link};
pub use config::GitHubConfig;
pub use fetcher::{RestFetcher, RestPageFetcher};
