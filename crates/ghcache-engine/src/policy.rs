//! Cache freshness policy.

use chrono::{DateTime, Utc};
use ghcache_core::MetadataRecord;
use std::time::Duration;

/// How long cached data may be served, and whether stale data may be served
/// while a refresh runs in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// Age after which cached data must be revalidated.
    pub max_age: Duration,
    /// Serve stale data immediately and refresh it asynchronously.
    pub background_refresh: bool,
}

/// What to do with a cached entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Within `max_age`: serve as-is.
    Serve,
    /// Stale: serve now, refresh in the background.
    ServeAndRefresh,
    /// Stale: revalidate with the remote before answering.
    Revalidate,
}

impl CachePolicy {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            background_refresh: false,
        }
    }

    pub fn max_age_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Revalidate on every call.
    pub fn always_revalidate() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn with_background_refresh(mut self, enabled: bool) -> Self {
        self.background_refresh = enabled;
        self
    }

    /// Decide how to treat a cached entry at `now`.
    pub fn decide(&self, record: &MetadataRecord, now: DateTime<Utc>) -> Decision {
        let max_age = chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::MAX);
        if record.is_fresh(now, max_age) {
            Decision::Serve
        } else if self.background_refresh {
            Decision::ServeAndRefresh
        } else {
            Decision::Revalidate
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::max_age_secs(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ghcache_core::SchemaVersion;

    fn record(updated: DateTime<Utc>) -> MetadataRecord {
        MetadataRecord::new(updated, "v", "h", &SchemaVersion::new(&[2]))
    }

    #[test]
    fn test_decisions() {
        let t0 = Utc::now();
        let meta = record(t0);
        let policy = CachePolicy::max_age_secs(300);
        let later = t0 + chrono::Duration::seconds(400);

        assert_eq!(policy.decide(&meta, t0 + chrono::Duration::seconds(10)), Decision::Serve);
        assert_eq!(policy.decide(&meta, later), Decision::Revalidate);
        assert_eq!(
            policy.with_background_refresh(true).decide(&meta, later),
            Decision::ServeAndRefresh
        );
    }

    #[test]
    fn test_always_revalidate() {
        let t0 = Utc::now();
        assert_eq!(
            CachePolicy::always_revalidate().decide(&record(t0), t0),
            Decision::Revalidate
        );
    }

    #[test]
    fn test_huge_max_age_never_expires() {
        let t0 = Utc::now();
        let policy = CachePolicy::new(Duration::from_secs(u64::MAX));
        assert_eq!(
            policy.decide(&record(t0), t0 + chrono::Duration::days(3650)),
            Decision::Serve
        );
    }
}
