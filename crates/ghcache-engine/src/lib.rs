//! Cache-aside engine for rate-limited, paginated REST APIs.
//!
//! [`StalenessEngine::resolve`] serves a cached value, revalidates it with
//! the remote, or refreshes it in the background, depending on the
//! [`CachePolicy`]. [`PaginationCollector`] and [`FanOutAggregator`] build
//! multi-page and multi-entity operations on top of it.

pub mod collector;
pub mod engine;
pub mod fanout;
pub mod fetcher;
pub mod policy;
mod refresh;

#[cfg(test)]
mod testing;

pub use collector::{CollectionFetcher, PaginationCollector, composite_validator};
pub use engine::{EngineBuilder, Outcome, Resolved, StalenessEngine};
pub use fanout::{FanOutAggregator, FanOutResult, Merged};
pub use fetcher::{FnFetcher, FnPageFetcher};
pub use policy::{CachePolicy, Decision};
