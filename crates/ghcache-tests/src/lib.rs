//! Integration test infrastructure for ghcache.
//!
//! Provides an in-memory harness with a manual clock, scripted fetchers and
//! payload fixtures. GitHub itself is replaced by a `wiremock` server.
//! With the `redis` feature, a Redis testcontainer backs the store tests.
//!
//! # Usage
//!
//! ```ignore
//! use ghcache_tests::Harness;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let h = Harness::new();
//!     // Use h.engine, h.store, h.clock, etc.
//! }
//! ```

#[cfg(feature = "redis")]
pub mod containers;
pub mod fixtures;
pub mod helpers;

#[cfg(feature = "redis")]
pub use containers::*;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,ghcache=debug")),
        )
        .with_test_writer()
        .try_init();
}
