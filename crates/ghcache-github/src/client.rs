//! GitHub API HTTP client.
//!
//! Issues conditional GETs and extracts the caching-relevant response
//! headers: `ETag`, rate-limit budget, `Retry-After` and `Link`.

use crate::config::GitHubConfig;
use chrono::Utc;
use ghcache_core::{Credential, Error, FetchOutcome, Fetched, ResponseMeta, Result};
use reqwest::header::{
    ACCEPT, ETAG, HeaderMap, HeaderValue, IF_NONE_MATCH, LINK, RETRY_AFTER,
};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Wait applied to a 429 that names no delay of its own.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Outcome of one GET plus whether the remote advertised a next page.
#[derive(Debug, Clone, PartialEq)]
pub struct RestResponse {
    pub outcome: FetchOutcome,
    /// `None` when the response carried no `Link` header and the status
    /// alone does not settle it (a 304).
    pub has_next: Option<bool>,
}

/// GitHub REST client with default headers applied.
#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    config: GitHubConfig,
    base: Url,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        config.validate()?;
        let mut base = config.base()?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_str(&config.api_version)
                .map_err(|e| Error::Config(format!("Invalid api_version: {}", e)))?,
        );

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config, base })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    /// Absolute URL of an API path such as `/orgs/contoso/repos`.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Internal(format!("Invalid API path {}: {}", path, e)))
    }

    /// GET `path`, conditionally on `validator` when given.
    pub async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
        credential: Option<&Credential>,
        validator: Option<&str>,
    ) -> Result<RestResponse> {
        let url = self.url(path)?;
        let mut request = self.http.get(url.clone()).query(query);
        if let Some(credential) = credential {
            request = request.bearer_auth(credential.expose());
        }
        if let Some(validator) = validator {
            request = request.header(IF_NONE_MATCH, validator);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("GET {} failed: {}", url.path(), e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let meta = response_meta(&headers);
        let link = headers.get(LINK).and_then(|v| v.to_str().ok());

        if status == StatusCode::NOT_MODIFIED {
            debug!(path = %url.path(), "Not modified");
            return Ok(RestResponse {
                outcome: FetchOutcome::NotModified(meta),
                has_next: link.map(has_next_link),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("Reading {} failed: {}", url.path(), e)))?;

        if !status.is_success() {
            let message = error_message(&body);
            if let Some(retry_after) = rate_limit_delay(status, &meta) {
                debug!(
                    path = %url.path(),
                    status = status.as_u16(),
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limited"
                );
                return Err(Error::RateLimited {
                    status: status.as_u16(),
                    retry_after,
                    message,
                });
            }
            return Err(Error::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = serde_json::from_slice(&body).map_err(|e| {
            Error::InvalidPayload(format!("{} returned invalid JSON: {}", url.path(), e))
        })?;
        let validator = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| body_validator(&body));

        debug!(path = %url.path(), validator = %validator, "Fetched");
        Ok(RestResponse {
            outcome: FetchOutcome::Modified(Fetched {
                payload,
                validator,
                page_validators: Vec::new(),
                meta,
            }),
            has_next: Some(link.is_some_and(has_next_link)),
        })
    }
}

/// Whether a `Link` header advertises a `rel="next"` target.
pub fn has_next_link(header: &str) -> bool {
    header.split(',').any(|link| {
        link.split(';').skip(1).any(|param| {
            let Some((name, value)) = param.split_once('=') else {
                return false;
            };
            name.trim().eq_ignore_ascii_case("rel")
                && value
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
                    .any(|rel| rel.eq_ignore_ascii_case("next"))
        })
    })
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn response_meta(headers: &HeaderMap) -> ResponseMeta {
    let remaining = header_u64(headers, "x-ratelimit-remaining");
    let retry_after = header_u64(headers, RETRY_AFTER.as_str())
        .map(Duration::from_secs)
        .or_else(|| {
            // With the budget exhausted, wait for the window to reset.
            if remaining != Some(0) {
                return None;
            }
            let reset = header_u64(headers, "x-ratelimit-reset")?;
            let now = Utc::now().timestamp().max(0) as u64;
            Some(Duration::from_secs(reset.saturating_sub(now)))
        });

    ResponseMeta {
        rate_limit_remaining: remaining,
        retry_after,
    }
}

/// Delay before retrying a rate-limited response, if it is one.
///
/// A 429 is always rate limiting. A 403 only is when it names a delay or
/// the primary budget is exhausted.
fn rate_limit_delay(status: StatusCode, meta: &ResponseMeta) -> Option<Duration> {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            Some(meta.retry_after.unwrap_or(DEFAULT_RATE_LIMIT_WAIT))
        }
        StatusCode::FORBIDDEN => meta.retry_after,
        _ => None,
    }
}

/// Validator for responses without an `ETag`.
fn body_validator(body: &[u8]) -> String {
    format!("\"sha256:{}\"", hex::encode(Sha256::digest(body)))
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(200).collect())
}
