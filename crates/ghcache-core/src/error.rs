//! Error types for ghcache.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Remote errors
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Remote returned status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Rate limited (status {status}), retry after {}s: {message}", retry_after.as_secs())]
    RateLimited {
        status: u16,
        retry_after: Duration,
        message: String,
    },

    // Store errors
    #[error("Shared store unavailable: {0}")]
    StoreUnavailable(String),

    // Payload errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // Aggregate operation errors
    #[error("Collection failed on page {page}: {source}")]
    Collection {
        page: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("Fan-out failed for entity {entity}: {source}")]
    FanOut {
        entity: String,
        #[source]
        source: Box<Error>,
    },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error came from the remote API rather than the cache.
    pub fn is_remote(&self) -> bool {
        match self {
            Error::RemoteUnavailable(_) | Error::Remote { .. } | Error::RateLimited { .. } => true,
            Error::Collection { source, .. } | Error::FanOut { source, .. } => source.is_remote(),
            _ => false,
        }
    }

    /// Delay the remote asked for before the request may be retried.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Wrap an error raised while collecting the given page.
    pub fn on_page(self, page: u32) -> Self {
        Error::Collection {
            page,
            source: Box::new(self),
        }
    }

    /// Wrap an error raised while fanning out to the given entity.
    pub fn for_entity(self, entity: impl Into<String>) -> Self {
        Error::FanOut {
            entity: entity.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_remote_detection() {
        let err = Error::RemoteUnavailable("reset".into()).on_page(3);
        assert!(err.is_remote());
        assert!(err.to_string().contains("page 3"));

        let err = Error::StoreUnavailable("down".into()).for_entity("contoso");
        assert!(!err.is_remote());
        assert!(err.to_string().contains("contoso"));
    }

    #[test]
    fn test_rate_limited_carries_delay() {
        let err = Error::RateLimited {
            status: 429,
            retry_after: Duration::from_secs(3),
            message: "secondary rate limit".into(),
        };
        assert!(err.is_remote());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(Error::RemoteUnavailable("x".into()).retry_after(), None);
    }
}
