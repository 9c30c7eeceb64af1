//! Cross-entity fan-out integration tests.

use ghcache_core::{Credential, Error, FetchOutcome, KeyParams};
use ghcache_engine::{CachePolicy, FanOutAggregator, FnFetcher, StalenessEngine};
use ghcache_tests::{Harness, entity_credentials, org_repos_key, repo, repo_page};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;

/// Per-organization repository listing through the engine.
async fn org_repos(
    engine: &StalenessEngine,
    org: String,
    credential: Credential,
) -> ghcache_core::Result<(Arc<Value>, ghcache_core::Cost)> {
    let key = org_repos_key(&org);
    let fetcher = Arc::new(FnFetcher::new(move |_validator: Option<String>| {
        let org = org.clone();
        let credential = credential.clone();
        async move {
            if credential.expose() == "token-revoked" {
                return Err(Error::Remote {
                    status: 401,
                    message: "Bad credentials".into(),
                });
            }
            Ok(FetchOutcome::modified(repo_page(&org, 0, 2), format!("\"{}\"", org)))
        }
    }));
    engine.resolve_value(&key, fetcher, CachePolicy::max_age_secs(300)).await
}

#[tokio::test]
async fn test_fan_out_merges_entities_and_costs() {
    let h = Harness::new();
    let aggregator = FanOutAggregator::from_config(h.engine.config());
    let credentials = entity_credentials(&["contoso", "fabrikam", "northwind"]);

    let first = aggregator
        .fan_out(&credentials, |org, credential| org_repos(&h.engine, org, credential))
        .await
        .unwrap();
    assert_eq!(
        first.results.keys().cloned().collect::<Vec<_>>(),
        vec!["contoso", "fabrikam", "northwind"]
    );
    assert_eq!(first.results["fabrikam"][0]["full_name"], json!("fabrikam/repo-0"));
    assert_eq!(first.cost.remote_calls, 3);
    assert_eq!(first.cost.body_sets, 3);

    let second = aggregator
        .fan_out(&credentials, |org, credential| org_repos(&h.engine, org, credential))
        .await
        .unwrap();
    assert_eq!(second.cost.remote_calls, 0);
    assert_eq!(second.cost.remote_avoided, 3);
}

#[tokio::test]
async fn test_fan_out_fails_on_any_entity() {
    let h = Harness::new();
    let aggregator = FanOutAggregator::default();
    let mut credentials = entity_credentials(&["contoso", "fabrikam"]);
    credentials.insert("oldcorp".to_string(), Credential::new("token-revoked"));

    let err = aggregator
        .fan_out(&credentials, |org, credential| org_repos(&h.engine, org, credential))
        .await
        .unwrap_err();
    match err {
        Error::FanOut { entity, source } => {
            assert_eq!(entity, "oldcorp");
            assert!(matches!(*source, Error::Remote { status: 401, .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_nested_fan_out_attaches_teams() {
    let h = Harness::new();
    let aggregator = FanOutAggregator::default();
    let credentials = entity_credentials(&["contoso"]);

    let outer = aggregator
        .fan_out(&credentials, |org, credential| org_repos(&h.engine, org, credential))
        .await
        .unwrap();

    let merged = aggregator
        .fan_out_nested(&outer, &credentials, "teams", |org, item, _credential| {
            let engine = h.engine.clone();
            async move {
                let name = item["name"].as_str().unwrap_or_default().to_string();
                let key = KeyParams::new()
                    .param("org", org.as_str())
                    .param("repo", name.as_str())
                    .key("repoTeams");
                let fetcher = Arc::new(FnFetcher::new(move |_validator: Option<String>| {
                    let name = name.clone();
                    async move {
                        if name == "repo-1" {
                            Err(Error::RemoteUnavailable("timeout".into()))
                        } else {
                            Ok(FetchOutcome::modified(json!([{"slug": "core"}]), "\"teams\""))
                        }
                    }
                }));
                engine
                    .resolve_value(&key, fetcher, CachePolicy::max_age_secs(300))
                    .await
            }
        })
        .await;

    let repos = merged.results["contoso"].as_array().unwrap();
    assert_eq!(repos[0]["teams"], json!([{"slug": "core"}]));
    assert!(repos[1].get("teams").is_none());
    assert_eq!(repos[1]["name"], repo("contoso", "repo-1", 1)["name"]);
    // Outer listing plus the one successful nested call.
    assert_eq!(merged.cost.remote_calls, 2);
}
