//! GitHub GraphQL client.
//!
//! [`ProjectsApi`] is the seam between the pipeline and the network:
//! production code uses [`GitHubClient`], tests substitute an in-memory
//! implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::error::{ProjectsError, ProjectsResult};
use crate::query::GraphQLRequest;

/// GitHub GraphQL endpoint.
pub const GITHUB_GRAPHQL_ENDPOINT: &str = "https://api.github.com/graphql";

/// Fallback wait when GitHub rate limits without a `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Longest slice of an error body kept in log messages.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// The `{data, errors}` envelope of a GraphQL response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphQLResponse {
    /// Response data (possibly partial).
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// GraphQL errors.
    #[serde(default)]
    pub errors: Option<Vec<GraphQLError>>,
}

impl GraphQLResponse {
    /// Wrap a successful `data` payload.
    pub fn from_data(data: serde_json::Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Errors reported alongside the data, empty if none.
    pub fn errors(&self) -> &[GraphQLError] {
        self.errors.as_deref().unwrap_or_default()
    }
}

/// A single GraphQL error entry.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQLError {
    /// Human-readable message.
    pub message: String,
    /// GitHub error type (e.g. `NOT_FOUND`, `RATE_LIMITED`).
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

impl GraphQLError {
    /// Create an error entry.
    pub fn new(message: impl Into<String>, error_type: Option<&str>) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.map(str::to_string),
        }
    }

    /// Whether GitHub classified the error as a missing object.
    pub fn is_not_found(&self) -> bool {
        self.error_type.as_deref() == Some("NOT_FOUND")
    }

    /// Whether GitHub classified the error as a rate limit.
    pub fn is_rate_limited(&self) -> bool {
        self.error_type.as_deref() == Some("RATE_LIMITED")
    }
}

/// Executes GraphQL requests against the project-management API.
#[async_trait]
pub trait ProjectsApi: Send + Sync {
    /// Execute one request and return its envelope.
    ///
    /// Transport failures and non-2xx responses are errors; GraphQL-level
    /// `errors` are returned in the envelope for the normalizer to judge.
    async fn execute(&self, request: &GraphQLRequest) -> ProjectsResult<GraphQLResponse>;
}

/// GitHub GraphQL API client.
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    endpoint: String,
    token: SecretString,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl GitHubClient {
    /// Create a client for the public GitHub endpoint.
    pub fn new(token: impl Into<String>) -> ProjectsResult<Self> {
        Self::with_endpoint(token, GITHUB_GRAPHQL_ENDPOINT)
    }

    /// Create a client for a custom endpoint (GitHub Enterprise, tests).
    pub fn with_endpoint(
        token: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> ProjectsResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ProjectsError::Config("GitHub token is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProjectsError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: SecretString::new(token.into()),
        })
    }

    /// The GraphQL endpoint in use.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ProjectsApi for GitHubClient {
    async fn execute(&self, request: &GraphQLRequest) -> ProjectsResult<GraphQLResponse> {
        debug!(endpoint = %self.endpoint, variables = %request.variables, "Sending GraphQL request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .header(USER_AGENT, concat!("projectbot/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        // Check for rate limiting
        if status.as_u16() == 429 || (status.as_u16() == 403 && remaining.as_deref() == Some("0"))
        {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!("GitHub rate limited the request, retry after {}s", retry_after);
            return Err(ProjectsError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            error!("GitHub API error ({}): {}", status, body);
            return Err(ProjectsError::Upstream(format!(
                "GitHub API error ({}): {}",
                status, body
            )));
        }

        let envelope: GraphQLResponse = response.json().await?;

        if envelope.errors().iter().any(GraphQLError::is_rate_limited) {
            return Err(ProjectsError::RateLimited {
                retry_after_secs: DEFAULT_RETRY_AFTER_SECS,
            });
        }

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::build_projects_query;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GitHubClient {
        GitHubClient::with_endpoint("ghp_test", format!("{}/graphql", server.uri())).unwrap()
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            GitHubClient::new(" "),
            Err(ProjectsError::Config(_))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = GitHubClient::new("ghp_supersecret").unwrap();
        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("ghp_supersecret"));
        assert!(debug_str.contains("[REDACTED]"));
        assert_eq!(client.endpoint(), GITHUB_GRAPHQL_ENDPOINT);
    }

    #[test]
    fn test_graphql_error_classification() {
        assert!(GraphQLError::new("missing", Some("NOT_FOUND")).is_not_found());
        assert!(GraphQLError::new("slow down", Some("RATE_LIMITED")).is_rate_limited());
        assert!(!GraphQLError::new("boom", None).is_not_found());
        assert!(GraphQLResponse::default().errors().is_empty());
    }

    #[tokio::test]
    async fn test_execute_sends_bearer_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "Bearer ghp_test"))
            .and(body_partial_json(serde_json::json!({
                "variables": {"login": "acme", "cursor": null}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"organization": {"projectsV2": {
                    "pageInfo": {"endCursor": null, "hasNextPage": false},
                    "nodes": []
                }}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let envelope = client_for(&server)
            .execute(&build_projects_query("acme", None))
            .await
            .expect("execute");
        assert!(envelope.data.is_some());
        assert!(envelope.errors().is_empty());
    }

    #[tokio::test]
    async fn test_execute_returns_graphql_errors_in_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"organization": {"projectV2": null}},
                "errors": [{"type": "NOT_FOUND", "message": "Could not resolve to a ProjectV2 with the number 99."}]
            })))
            .mount(&server)
            .await;

        let envelope = client_for(&server)
            .execute(&build_projects_query("acme", None))
            .await
            .unwrap();
        assert_eq!(envelope.errors().len(), 1);
        assert!(envelope.errors()[0].is_not_found());
    }

    #[tokio::test]
    async fn test_execute_rate_limited_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "17"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .execute(&build_projects_query("acme", None))
            .await;
        assert!(matches!(
            result,
            Err(ProjectsError::RateLimited {
                retry_after_secs: 17
            })
        ));
    }

    #[tokio::test]
    async fn test_execute_secondary_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .execute(&build_projects_query("acme", None))
            .await;
        assert!(matches!(result, Err(ProjectsError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_execute_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .execute(&build_projects_query("acme", None))
            .await;
        match result {
            Err(ProjectsError::Upstream(msg)) => assert!(msg.contains("502")),
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let result = client_for(&server)
            .execute(&build_projects_query("acme", None))
            .await;
        assert!(result.is_err());
    }
}
