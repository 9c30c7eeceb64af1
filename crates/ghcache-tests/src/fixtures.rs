//! Sample payloads and keys.

use ghcache_core::{CacheKey, Credential, KeyParams};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Key of the organization repository listing used throughout the tests.
pub fn org_repos_key(org: &str) -> CacheKey {
    KeyParams::new()
        .param("org", org)
        .param("per_page", 100)
        .key("orgRepos")
}

/// One repository object as GitHub returns it, trimmed to a few fields.
pub fn repo(org: &str, name: &str, stars: u64) -> Value {
    json!({
        "name": name,
        "full_name": format!("{}/{}", org, name),
        "private": false,
        "stargazers_count": stars,
    })
}

/// A page of `count` repositories numbered from `first`.
pub fn repo_page(org: &str, first: usize, count: usize) -> Value {
    Value::Array(
        (first..first + count)
            .map(|i| repo(org, &format!("repo-{}", i), i as u64))
            .collect(),
    )
}

/// Credentials for the given entities.
pub fn entity_credentials(entities: &[&str]) -> BTreeMap<String, Credential> {
    entities
        .iter()
        .map(|entity| (entity.to_string(), Credential::new(format!("token-{}", entity))))
        .collect()
}
