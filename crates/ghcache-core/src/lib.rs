//! ghcache core
//!
//! Shared vocabulary for the ghcache engine: errors, cache keys, cost
//! accounting, cached record shapes, configuration and the port traits
//! implemented by store and remote adapters.

pub mod clock;
pub mod config;
pub mod cost;
pub mod credential;
pub mod error;
pub mod key;
pub mod ports;
pub mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CompressionType, EngineConfig};
pub use cost::Cost;
pub use credential::Credential;
pub use error::{Error, Result};
pub use key::{CacheKey, KeyParams};
pub use ports::{
    FetchOutcome, Fetched, Page, PageFetcher, RemoteFetcher, ResponseMeta, Revalidation,
    SharedStore,
};
pub use record::{MetadataRecord, PageValidator, SchemaVersion, content_hash};
