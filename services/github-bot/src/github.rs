//! GitHub REST Client
//!
//! [`GitHubPlatform`] over `reqwest`. Authenticates with a bearer token
//! (installation token or PAT) and follows pagination on list endpoints.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::PlatformError;
use crate::platform::{
    Branch, Comment, GitHubPlatform, GitRef, Issue, IssueState, NewIssue, NewPullRequest,
    PullRequest, Repository,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Applied to every request, including the installation token exchange.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "cle-roboto";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;

/// HTTP client with the bot's user agent and [`REQUEST_TIMEOUT`].
pub fn http_client() -> Result<Client, PlatformError> {
    Ok(client_builder(REQUEST_TIMEOUT).build()?)
}

fn client_builder(timeout: Duration) -> ClientBuilder {
    Client::builder().timeout(timeout).user_agent(USER_AGENT)
}

pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, PlatformError> {
        Ok(Self::with_http_client(api_url, token, http_client()?))
    }

    fn with_http_client(
        api_url: impl Into<String>,
        token: impl Into<String>,
        http: Client,
    ) -> Self {
        Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        endpoint: &str,
    ) -> Result<T, PlatformError> {
        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if !status.is_success() {
            let err = classify(status, &headers, endpoint, &body);
            warn!(
                endpoint = %endpoint,
                status = status.as_u16(),
                error = %err,
                "GitHub API call failed"
            );
            return Err(err);
        }

        serde_json::from_str(&body).map_err(|source| PlatformError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PlatformError> {
        self.send(self.request(Method::GET, path), path).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, PlatformError> {
        self.send(self.request(Method::POST, path).json(body), path)
            .await
    }

    /// Fetch every page of a list endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, PlatformError> {
        let mut items = Vec::new();
        let mut page = 1usize;

        loop {
            let builder = self
                .request(Method::GET, path)
                .query(query)
                .query(&[("per_page", PER_PAGE), ("page", page)]);
            let batch: Vec<T> = self.send(builder, path).await?;
            let len = batch.len();
            items.extend(batch);

            if len < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(endpoint = %path, count = items.len(), pages = page, "Listed GitHub resources");
        Ok(items)
    }
}

fn repo_path(owner: &str, repo: &str) -> String {
    format!(
        "/repos/{}/{}",
        urlencoding::encode(owner),
        urlencoding::encode(repo)
    )
}

/// Map a non-success response to a [`PlatformError`].
pub(crate) fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    endpoint: &str,
    body: &str,
) -> PlatformError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string());

    let rate_limit_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);

    match status {
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimited { message },
        StatusCode::FORBIDDEN if rate_limit_exhausted || message.contains("rate limit") => {
            PlatformError::RateLimited { message }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        StatusCode::NOT_FOUND => PlatformError::NotFound {
            resource: endpoint.to_string(),
        },
        StatusCode::UNPROCESSABLE_ENTITY => PlatformError::Validation { message },
        _ => PlatformError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[derive(serde::Deserialize)]
struct Comparison {
    ahead_by: u64,
}

#[async_trait]
impl GitHubPlatform for GitHubClient {
    async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository, PlatformError> {
        self.get(&repo_path(owner, repo)).await
    }

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        labels: &[String],
    ) -> Result<Vec<Issue>, PlatformError> {
        let mut query = vec![("state", "all".to_string())];
        if !labels.is_empty() {
            query.push(("labels", labels.join(",")));
        }

        let issues: Vec<Issue> = self
            .get_all(&format!("{}/issues", repo_path(owner, repo)), &query)
            .await?;

        Ok(issues
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .collect())
    }

    async fn create_issue(
        &self,
        owner: &str,
        repo: &str,
        issue: &NewIssue,
    ) -> Result<Issue, PlatformError> {
        self.post(&format!("{}/issues", repo_path(owner, repo)), issue)
            .await
    }

    async fn set_issue_state(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        state: IssueState,
    ) -> Result<Issue, PlatformError> {
        let path = format!("{}/issues/{}", repo_path(owner, repo), number);
        let builder = self
            .request(Method::PATCH, &path)
            .json(&serde_json::json!({ "state": state.as_str() }));
        self.send(builder, &path).await
    }

    async fn create_issue_comment(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
        body: &str,
    ) -> Result<Comment, PlatformError> {
        self.post(
            &format!("{}/issues/{}/comments", repo_path(owner, repo), number),
            &serde_json::json!({ "body": body }),
        )
        .await
    }

    async fn list_branches(&self, owner: &str, repo: &str) -> Result<Vec<Branch>, PlatformError> {
        self.get_all(&format!("{}/branches", repo_path(owner, repo)), &[])
            .await
    }

    async fn get_branch(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<Branch, PlatformError> {
        self.get(&format!(
            "{}/branches/{}",
            repo_path(owner, repo),
            urlencoding::encode(branch)
        ))
        .await
    }

    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        ref_name: &str,
        sha: &str,
    ) -> Result<GitRef, PlatformError> {
        self.post(
            &format!("{}/git/refs", repo_path(owner, repo)),
            &serde_json::json!({ "ref": ref_name, "sha": sha }),
        )
        .await
    }

    async fn list_open_pull_requests(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Vec<PullRequest>, PlatformError> {
        self.get_all(
            &format!("{}/pulls", repo_path(owner, repo)),
            &[("state", "open".to_string())],
        )
        .await
    }

    async fn create_pull_request(
        &self,
        owner: &str,
        repo: &str,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest, PlatformError> {
        self.post(&format!("{}/pulls", repo_path(owner, repo)), pull_request)
            .await
    }

    async fn commits_ahead(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<u64, PlatformError> {
        let comparison: Comparison = self
            .get(&format!(
                "{}/compare/{}...{}",
                repo_path(owner, repo),
                urlencoding::encode(base),
                urlencoding::encode(head)
            ))
            .await?;
        Ok(comparison.ahead_by)
    }
}
