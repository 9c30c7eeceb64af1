//! Shared store adapters for ghcache.
//!
//! The metadata and body stores are thin typed views over one
//! [`SharedStore`](ghcache_core::SharedStore); the local cache is a
//! process-private layer in front of the body store.

pub mod body;
pub mod compression;
pub mod local;
pub mod memory;
pub mod metadata;
#[cfg(feature = "redis")]
pub mod redis;

pub use body::BodyStore;
pub use compression::{compress, decode_body, decompress, encode_body};
pub use local::LocalCache;
pub use memory::{InMemoryStore, StoreStats};
pub use metadata::MetadataStore;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisStore};
