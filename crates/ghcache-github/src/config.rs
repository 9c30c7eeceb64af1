//! GitHub client configuration.

use ghcache_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Configuration for [`GitHubClient`](crate::GitHubClient).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitHubConfig {
    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Default page size for collection endpoints.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Value of the `X-GitHub-Api-Version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    format!("ghcache/{}", env!("CARGO_PKG_VERSION"))
}

fn default_per_page() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_api_version() -> String {
    "2022-11-28".to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            per_page: default_per_page(),
            request_timeout_secs: default_request_timeout_secs(),
            api_version: default_api_version(),
        }
    }
}

impl GitHubConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.base()?;
        if self.per_page == 0 || self.per_page > 100 {
            return Err(Error::Config(format!(
                "per_page must be between 1 and 100, got {}",
                self.per_page
            )));
        }
        Ok(())
    }

    /// Parsed base URL.
    pub fn base(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base_url {}: {}", self.base_url, e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = GitHubConfig::from_yaml("{}").unwrap();
        assert_eq!(config, GitHubConfig::default());
        assert_eq!(config.per_page, 100);
        assert_eq!(config.api_version, "2022-11-28");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(GitHubConfig::from_yaml("base_url: not a url").is_err());
        assert!(GitHubConfig::from_yaml("per_page: 500").is_err());
    }
}
