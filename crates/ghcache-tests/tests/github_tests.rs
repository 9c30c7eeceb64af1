//! End-to-end tests against a mock GitHub API.

use ghcache_core::Credential;
use ghcache_engine::{CachePolicy, Outcome, PaginationCollector};
use ghcache_github::{RestFetcher, RestPageFetcher};
use ghcache_tests::{Harness, github_client, repo_page};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_repo_revalidated_with_etag() {
    let h = Harness::new();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/contoso/api"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "api", "stargazers_count": 7}))
                .insert_header("etag", "W/\"repo-v1\"")
                .insert_header("x-ratelimit-remaining", "4999"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/contoso/api"))
        .and(header("if-none-match", "W/\"repo-v1\""))
        .respond_with(ResponseTemplate::new(304).insert_header("x-ratelimit-remaining", "4998"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = RestFetcher::new(github_client(&server.uri()), "/repos/contoso/api")
        .with_credential(Credential::new("token-contoso"));
    let key = fetcher.cache_key("repo");
    let fetcher = Arc::new(fetcher);

    let first = h
        .engine
        .resolve(&key, fetcher.clone(), CachePolicy::always_revalidate())
        .await
        .unwrap();
    assert_eq!(first.outcome, Outcome::Fetched);
    assert_eq!(first.validator, "W/\"repo-v1\"");

    let second = h
        .engine
        .resolve(&key, fetcher.clone(), CachePolicy::always_revalidate())
        .await
        .unwrap();
    assert_eq!(second.outcome, Outcome::Revalidated);
    assert_eq!(second.value, first.value);
    assert_eq!(second.cost.rate_limit_remaining, Some(4998));
    assert_eq!(second.cost.body_sets, 0);
}

#[tokio::test]
async fn test_org_repos_collected_across_link_pages() {
    let h = Harness::new();
    let server = MockServer::start().await;
    let next = format!(
        "<{}/orgs/contoso/repos?per_page=100&page=2>; rel=\"next\", <{}/orgs/contoso/repos?per_page=100&page=2>; rel=\"last\"",
        server.uri(),
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/orgs/contoso/repos"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(repo_page("contoso", 0, 100))
                .insert_header("etag", "\"page-1\"")
                .insert_header("link", next.as_str()),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/contoso/repos"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(repo_page("contoso", 100, 20))
                .insert_header("etag", "\"page-2\""),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/contoso/repos"))
        .and(query_param("page", "1"))
        .and(header("if-none-match", "\"page-1\""))
        .respond_with(ResponseTemplate::new(304).insert_header("link", next.as_str()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/contoso/repos"))
        .and(query_param("page", "2"))
        .and(header("if-none-match", "\"page-2\""))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let pages = RestPageFetcher::new(github_client(&server.uri()), "/orgs/contoso/repos")
        .with_credential(Credential::new("token-contoso"));
    let key = pages.cache_key("orgRepos");
    let pages = Arc::new(pages);
    let collector = PaginationCollector::new(h.engine.clone());

    let (repos, cost) = collector
        .collect_all(&key, pages.clone(), 10, CachePolicy::always_revalidate())
        .await
        .unwrap();
    assert_eq!(repos.as_array().map(Vec::len), Some(120));
    assert_eq!(repos[119]["name"], json!("repo-119"));
    assert_eq!(cost.remote_calls, 2);

    let again = collector
        .collect(&key, pages.clone(), 10, CachePolicy::always_revalidate())
        .await
        .unwrap();
    assert_eq!(again.outcome, Outcome::Revalidated);
    assert_eq!(again.value, repos);
    assert_eq!(again.cost.remote_not_modified, 2);
}

#[tokio::test]
async fn test_secondary_rate_limit_suspends_collection() {
    let h = Harness::new();
    let server = MockServer::start().await;
    let next = format!(
        "<{}/orgs/contoso/repos?per_page=100&page=2>; rel=\"next\"",
        server.uri()
    );

    Mock::given(method("GET"))
        .and(path("/orgs/contoso/repos"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(repo_page("contoso", 0, 100))
                .insert_header("etag", "\"page-1\"")
                .insert_header("link", next.as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/contoso/repos"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({"message": "secondary rate limit"}))
                .insert_header("retry-after", "1"),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/contoso/repos"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(repo_page("contoso", 100, 5))
                .insert_header("etag", "\"page-2\""),
        )
        .mount(&server)
        .await;

    let pages = RestPageFetcher::new(github_client(&server.uri()), "/orgs/contoso/repos")
        .with_credential(Credential::new("token-contoso"));
    let key = pages.cache_key("orgRepos");
    let collector = PaginationCollector::new(h.engine.clone());

    let (repos, cost) = collector
        .collect_all(&key, Arc::new(pages), 10, CachePolicy::default())
        .await
        .unwrap();
    assert_eq!(repos.as_array().map(Vec::len), Some(105));
    assert_eq!(cost.remote_calls, 2);
}
