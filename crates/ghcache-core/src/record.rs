//! Cached record shapes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Freshness and validator state for one cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Last time the cached content was confirmed current.
    pub updated: DateTime<Utc>,
    /// Last time the cached content actually changed.
    pub changed: DateTime<Utc>,
    /// Validator of the cached content version.
    pub validator: String,
    /// When a background refresh claim was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshing: Option<DateTime<Utc>>,
    /// Id of the worker holding the refresh claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_id: Option<String>,
    /// Engine schema version that wrote the record.
    pub schema_version: String,
    /// Per-page validators for collections, in page order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub page_validators: Vec<PageValidator>,
    /// Digest of the cached payload.
    #[serde(default)]
    pub content_hash: String,
    /// Remaining rate-limit budget reported with the last response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_remaining: Option<u64>,
}

/// Validator and item count of one collection page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageValidator {
    pub validator: String,
    pub items: usize,
}

impl PageValidator {
    pub fn new(validator: impl Into<String>, items: usize) -> Self {
        Self {
            validator: validator.into(),
            items,
        }
    }
}

impl MetadataRecord {
    /// Create a record for freshly fetched content.
    pub fn new(
        now: DateTime<Utc>,
        validator: impl Into<String>,
        content_hash: impl Into<String>,
        schema_version: &SchemaVersion,
    ) -> Self {
        Self {
            updated: now,
            changed: now,
            validator: validator.into(),
            refreshing: None,
            refresh_id: None,
            schema_version: schema_version.to_string(),
            page_validators: Vec::new(),
            content_hash: content_hash.into(),
            rate_limit_remaining: None,
        }
    }

    /// Whether the content is still within `max_age` of its last confirmation.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.updated.checked_add_signed(max_age) {
            Some(deadline) => now < deadline,
            None => true,
        }
    }

    /// Number of pages seen when the content was last fetched.
    pub fn pages(&self) -> u32 {
        self.page_validators.len() as u32
    }

    /// Whether the record was written by a schema at least `minimum`.
    ///
    /// Unparseable versions are never compatible.
    pub fn is_compatible(&self, minimum: &SchemaVersion) -> bool {
        self.schema_version
            .parse::<SchemaVersion>()
            .map(|version| &version >= minimum)
            .unwrap_or(false)
    }

    /// Whether another worker holds a refresh claim that is still inside `window`.
    pub fn has_live_claim(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match (self.refreshing, &self.refresh_id) {
            (Some(claimed_at), Some(_)) => match claimed_at.checked_add_signed(window) {
                Some(deadline) => now < deadline,
                None => true,
            },
            _ => false,
        }
    }

    /// Whether the refresh claim belongs to `id`.
    pub fn is_claimed_by(&self, id: &str) -> bool {
        self.refresh_id.as_deref() == Some(id)
    }

    /// Copy of the record carrying a refresh claim.
    pub fn with_claim(&self, now: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            refreshing: Some(now),
            refresh_id: Some(id.into()),
            ..self.clone()
        }
    }

    /// Copy of the record with the refresh claim cleared.
    pub fn without_claim(&self) -> Self {
        Self {
            refreshing: None,
            refresh_id: None,
            ..self.clone()
        }
    }
}

/// Dotted numeric schema version such as `2.1`.
///
/// Trailing zero components are insignificant, so `2` and `2.0` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(Vec<u64>);

impl SchemaVersion {
    pub fn new(components: &[u64]) -> Self {
        let mut parts = components.to_vec();
        while parts.last() == Some(&0) {
            parts.pop();
        }
        Self(parts)
    }
}

impl FromStr for SchemaVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .trim()
            .split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|_| Error::Config(format!("Invalid schema version: {}", s)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(&parts))
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("0");
        }
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// Hex SHA-256 digest of a payload's canonical JSON form.
pub fn content_hash(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
