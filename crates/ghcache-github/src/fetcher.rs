//! Fetcher ports backed by GitHub endpoints.

use crate::client::GitHubClient;
use async_trait::async_trait;
use ghcache_core::{
    CacheKey, Cost, Credential, FetchOutcome, KeyParams, Page, PageFetcher, RemoteFetcher, Result,
    Revalidation,
};

/// A single GitHub resource, fetched conditionally on its ETag.
#[derive(Clone)]
pub struct RestFetcher {
    client: GitHubClient,
    path: String,
    query: Vec<(String, String)>,
    credential: Option<Credential>,
}

impl RestFetcher {
    pub fn new(client: GitHubClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            query: Vec::new(),
            credential: None,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Cache key for this request under `operation`. The credential is not
    /// part of the key.
    pub fn cache_key(&self, operation: &str) -> CacheKey {
        request_key(operation, &self.path, &self.query, None)
    }
}

#[async_trait]
impl RemoteFetcher for RestFetcher {
    async fn fetch(
        &self,
        revalidate: Option<Revalidation<'_>>,
        cost: &mut Cost,
    ) -> Result<FetchOutcome> {
        let response = self
            .client
            .get(
                &self.path,
                &self.query,
                self.credential.as_ref(),
                revalidate.map(|r| r.validator),
            )
            .await?;
        response.outcome.charge(cost);
        Ok(response.outcome)
    }
}

/// A paginated GitHub collection endpoint.
#[derive(Clone)]
pub struct RestPageFetcher {
    client: GitHubClient,
    path: String,
    query: Vec<(String, String)>,
    credential: Option<Credential>,
    per_page: u32,
}

impl RestPageFetcher {
    pub fn new(client: GitHubClient, path: impl Into<String>) -> Self {
        let per_page = client.config().per_page;
        Self {
            client,
            path: path.into(),
            query: Vec::new(),
            credential: None,
            per_page,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, 100);
        self
    }

    /// Cache key for the whole collection under `operation`.
    pub fn cache_key(&self, operation: &str) -> CacheKey {
        request_key(operation, &self.path, &self.query, Some(self.per_page))
    }
}

#[async_trait]
impl PageFetcher for RestPageFetcher {
    async fn fetch_page(
        &self,
        page: u32,
        validator: Option<&str>,
        cost: &mut Cost,
    ) -> Result<Page> {
        let mut query = self.query.clone();
        query.push(("per_page".to_string(), self.per_page.to_string()));
        query.push(("page".to_string(), page.to_string()));

        let response = self
            .client
            .get(&self.path, &query, self.credential.as_ref(), validator)
            .await?;
        response.outcome.charge(cost);
        Ok(Page {
            outcome: response.outcome,
            has_next: response.has_next,
        })
    }
}

fn request_key(
    operation: &str,
    path: &str,
    query: &[(String, String)],
    per_page: Option<u32>,
) -> CacheKey {
    let mut params = KeyParams::new().param("path", path);
    for (name, value) in query {
        params = params.param(name.as_str(), value.as_str());
    }
    params.optional("per_page", per_page).key(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitHubConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_cache_key_ignores_credential_and_query_order() {
        let client = GitHubClient::new(GitHubConfig::default()).unwrap();
        let a = RestPageFetcher::new(client.clone(), "/orgs/contoso/repos")
            .with_query("type", "all")
            .with_query("sort", "name")
            .with_credential(Credential::new("token-a"));
        let b = RestPageFetcher::new(client, "/orgs/contoso/repos")
            .with_query("sort", "name")
            .with_query("type", "all");

        assert_eq!(a.cache_key("orgRepos"), b.cache_key("orgRepos"));
        assert!(!a.cache_key("orgRepos").as_str().contains("token-a"));
    }

    #[tokio::test]
    async fn test_page_fetcher_sends_page_params() {
        let server = MockServer::start().await;
        let next = format!("<{}/orgs/contoso/repos?page=3>; rel=\"next\"", server.uri());
        Mock::given(method("GET"))
            .and(path("/orgs/contoso/repos"))
            .and(query_param("page", "2"))
            .and(query_param("per_page", "50"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"name": "api"}]))
                    .insert_header("etag", "\"p2\"")
                    .insert_header("link", next.as_str()),
            )
            .mount(&server)
            .await;

        let client = GitHubClient::new(GitHubConfig::default().with_base_url(server.uri())).unwrap();
        let fetcher = RestPageFetcher::new(client, "/orgs/contoso/repos").with_per_page(50);

        let mut cost = Cost::new();
        let page = fetcher.fetch_page(2, None, &mut cost).await.unwrap();
        assert_eq!(page.has_next, Some(true));
        assert_eq!(cost.remote_calls, 1);
    }
}
