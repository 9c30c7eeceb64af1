//! Engine configuration.

use crate::record::SchemaVersion;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Compression algorithm for body records.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    None,
    #[default]
    Gzip,
    Zstd,
    Lz4,
}

/// Configuration for the caching engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Schema version stamped on every metadata record written.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    /// Oldest schema version whose records are still trusted.
    #[serde(default = "default_schema_version")]
    pub min_schema_version: String,
    /// Long-term retention for metadata and current bodies, in minutes.
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: u64,
    /// Retention for a body once a newer version replaced it, in minutes.
    #[serde(default = "default_superseded_body_minutes")]
    pub superseded_body_minutes: u64,
    /// Delay between taking a refresh claim and calling the remote.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Estimated duration of one remote round trip.
    #[serde(default = "default_round_trip_estimate_ms")]
    pub round_trip_estimate_ms: u64,
    /// Fixed margin added to every refresh claim window.
    #[serde(default = "default_claim_margin_ms")]
    pub claim_margin_ms: u64,
    /// Extra claim margin per previously seen page.
    #[serde(default = "default_claim_margin_per_page_ms")]
    pub claim_margin_per_page_ms: u64,
    /// Codec used for new body records.
    #[serde(default)]
    pub compression: CompressionType,
    /// Maximum entries held by the local ephemeral cache.
    #[serde(default = "default_local_cache_capacity")]
    pub local_cache_capacity: usize,
    /// Retries of one collection page after a rate-limited response.
    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,
    /// Maximum entities processed concurrently by a fan-out.
    #[serde(default = "default_fan_out_concurrency")]
    pub fan_out_concurrency: usize,
    /// Prefix for every key written to the shared store.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_schema_version() -> String {
    "2".to_string()
}

fn default_retention_minutes() -> u64 {
    60 * 24 * 7 // 7 days
}

fn default_superseded_body_minutes() -> u64 {
    5
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_round_trip_estimate_ms() -> u64 {
    2000
}

fn default_claim_margin_ms() -> u64 {
    5000
}

fn default_claim_margin_per_page_ms() -> u64 {
    1000
}

fn default_local_cache_capacity() -> usize {
    1024
}

fn default_rate_limit_retries() -> u32 {
    3
}

fn default_fan_out_concurrency() -> usize {
    4
}

fn default_key_prefix() -> String {
    "ghcache:".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            min_schema_version: default_schema_version(),
            retention_minutes: default_retention_minutes(),
            superseded_body_minutes: default_superseded_body_minutes(),
            settle_delay_ms: default_settle_delay_ms(),
            round_trip_estimate_ms: default_round_trip_estimate_ms(),
            claim_margin_ms: default_claim_margin_ms(),
            claim_margin_per_page_ms: default_claim_margin_per_page_ms(),
            compression: CompressionType::default(),
            local_cache_capacity: default_local_cache_capacity(),
            rate_limit_retries: default_rate_limit_retries(),
            fan_out_concurrency: default_fan_out_concurrency(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants between fields.
    pub fn validate(&self) -> Result<()> {
        let current = self.current_schema()?;
        let minimum = self.minimum_schema()?;
        if minimum > current {
            return Err(Error::Config(format!(
                "min_schema_version {} is newer than schema_version {}",
                minimum, current
            )));
        }
        if self.fan_out_concurrency == 0 {
            return Err(Error::Config("fan_out_concurrency must be at least 1".into()));
        }
        if self.retention_minutes == 0 {
            return Err(Error::Config("retention_minutes must be at least 1".into()));
        }
        Ok(())
    }

    pub fn current_schema(&self) -> Result<SchemaVersion> {
        self.schema_version.parse()
    }

    pub fn minimum_schema(&self) -> Result<SchemaVersion> {
        self.min_schema_version.parse()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn round_trip_estimate(&self) -> Duration {
        Duration::from_millis(self.round_trip_estimate_ms)
    }

    pub fn claim_margin(&self) -> Duration {
        Duration::from_millis(self.claim_margin_ms)
    }

    pub fn claim_margin_per_page(&self) -> Duration {
        Duration::from_millis(self.claim_margin_per_page_ms)
    }

    /// Set the schema version written and the minimum accepted.
    pub fn with_schema(mut self, current: impl Into<String>, minimum: impl Into<String>) -> Self {
        self.schema_version = current.into();
        self.min_schema_version = minimum.into();
        self
    }

    /// Set the settle delay before background refreshes.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the body codec.
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Set how often a rate-limited page is retried.
    pub fn with_rate_limit_retries(mut self, retries: u32) -> Self {
        self.rate_limit_retries = retries;
        self
    }

    /// Set the fan-out concurrency bound.
    pub fn with_fan_out_concurrency(mut self, concurrency: usize) -> Self {
        self.fan_out_concurrency = concurrency;
        self
    }

    /// Set the shared store key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the local cache capacity.
    pub fn with_local_cache_capacity(mut self, capacity: usize) -> Self {
        self.local_cache_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.retention_minutes, 10080);
        assert_eq!(config.compression, CompressionType::Gzip);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
schema_version: "3.1"
min_schema_version: "3"
settle_delay_ms: 50
compression: zstd
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.settle_delay(), Duration::from_millis(50));
        assert_eq!(config.compression, CompressionType::Zstd);
        assert_eq!(config.fan_out_concurrency, 4);
        assert_eq!(config.key_prefix, "ghcache:");
    }

    #[test]
    fn test_minimum_newer_than_current_is_rejected() {
        let config = EngineConfig::default().with_schema("2", "3");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = EngineConfig::default().with_fan_out_concurrency(0);
        assert!(config.validate().is_err());
    }
}
