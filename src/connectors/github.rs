//! GitHub REST client
//!
//! Authenticated GET access to the repository, commits, pulls and issues
//! endpoints. Every request runs under the shared [`RetryPolicy`]:
//!
//! - `401` fails immediately with `AuthenticationFailure`
//! - `404` fails immediately with `ResourceNotFound`
//! - `403`/`429` are retried, and become `RateLimitedOrForbidden` on the last attempt
//! - anything else is retried, and becomes `ExternalServiceUnavailable` once the
//!   attempts run out

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};
use url::Url;

use super::retry::{RetryPolicy, Sleeper, TokioSleeper};
use super::trait_::{ProviderError, RepositoryProvider};
use crate::config::{GitHubClientConfig, SyncWindowConfig};

/// Media type pinning the REST API version.
pub const GITHUB_ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

/// GitHub API client
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    per_page: u32,
    closed_window: ChronoDuration,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

enum AttemptFailure {
    Fatal(ProviderError),
    Retryable { reason: String, forbidden: bool },
}

impl GitHubClient {
    pub fn new(
        config: &GitHubClientConfig,
        window: &SyncWindowConfig,
        retry: RetryPolicy,
    ) -> Result<Self, ProviderError> {
        let api_base = Url::parse(&config.api_base_url)
            .map_err(|e| ProviderError::Configuration(format!("invalid API base URL: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(ProviderError::Configuration(format!(
                "API base URL '{api_base}' cannot carry a path"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT_HEADER));

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to build client: {e}")))?;

        Ok(Self {
            http,
            api_base,
            per_page: config.per_page,
            closed_window: ChronoDuration::try_days(window.closed_item_window_days)
                .unwrap_or(ChronoDuration::MAX),
            retry,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the backoff sleeper.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn repo_url(&self, full_name: &str, tail: &[&str]) -> Result<Url, ProviderError> {
        let (owner, repo) = split_full_name(full_name)?;
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Configuration("API base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(["repos", owner, repo])
            .extend(tail);
        Ok(url)
    }

    fn listing_url(
        &self,
        full_name: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Url, ProviderError> {
        let mut url = self.repo_url(full_name, &[endpoint])?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query
                .append_pair("per_page", &self.per_page.to_string())
                .append_pair("page", "1");
        }
        Ok(url)
    }

    /// Runs one GET under the retry policy.
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        full_name: &str,
        url: Url,
        token: &str,
    ) -> Result<T, ProviderError> {
        let max_attempts = self.retry.max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.attempt::<T>(&url, token).await {
                Ok(value) => {
                    counter!("github_requests_total", "operation" => operation, "outcome" => "success")
                        .increment(1);
                    return Ok(value);
                }
                Err(AttemptFailure::Fatal(err)) => {
                    counter!("github_requests_total", "operation" => operation, "outcome" => "fatal")
                        .increment(1);
                    warn!(operation, full_name, attempt, error = %err, "GitHub request failed permanently");
                    return Err(err);
                }
                Err(AttemptFailure::Retryable { reason, forbidden }) => {
                    if self.retry.is_final(attempt) {
                        counter!("github_requests_total", "operation" => operation, "outcome" => "exhausted")
                            .increment(1);
                        error!(operation, full_name, attempt, reason = %reason, "GitHub request attempts exhausted");
                        if forbidden {
                            return Err(ProviderError::RateLimitedOrForbidden {
                                operation: describe(operation, full_name),
                            });
                        }
                        last_error = reason;
                        break;
                    }

                    let delay = self.retry.delay_after(attempt);
                    counter!("github_retries_total", "operation" => operation).increment(1);
                    warn!(
                        operation,
                        full_name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "GitHub request failed, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    last_error = reason;
                }
            }
        }

        Err(ProviderError::ExternalServiceUnavailable {
            operation: describe(operation, full_name),
            attempts: max_attempts,
            last_error,
        })
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &Url,
        token: &str,
    ) -> Result<T, AttemptFailure> {
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AttemptFailure::Retryable {
                reason: format!("request error: {}", e.without_url()),
                forbidden: false,
            })?;

        let status = response.status();
        debug!(path = url.path(), status = status.as_u16(), "GitHub response");

        match status.as_u16() {
            200..=299 => response
                .json::<T>()
                .await
                .map_err(|e| AttemptFailure::Retryable {
                    reason: format!("invalid response body: {}", e.without_url()),
                    forbidden: false,
                }),
            401 => Err(AttemptFailure::Fatal(ProviderError::AuthenticationFailure)),
            404 => Err(AttemptFailure::Fatal(ProviderError::ResourceNotFound {
                resource: url.path().to_string(),
            })),
            403 | 429 => Err(AttemptFailure::Retryable {
                reason: format!("GitHub responded {status}"),
                forbidden: true,
            }),
            _ => Err(AttemptFailure::Retryable {
                reason: format!("GitHub responded {status}"),
                forbidden: false,
            }),
        }
    }

    async fn fetch_open_and_recently_closed<T>(
        &self,
        full_name: &str,
        token: &str,
        endpoint: &str,
        operations: (&'static str, &'static str),
    ) -> Result<(Vec<T>, Vec<T>), ProviderError>
    where
        T: DeserializeOwned + Send,
    {
        let open_url = self.listing_url(full_name, endpoint, &[("state", "open")])?;
        let closed_url = self.listing_url(
            full_name,
            endpoint,
            &[("state", "closed"), ("sort", "updated"), ("direction", "desc")],
        )?;

        tokio::try_join!(
            self.get_json::<Vec<T>>(operations.0, full_name, open_url, token),
            self.get_json::<Vec<T>>(operations.1, full_name, closed_url, token),
        )
    }
}

#[async_trait]
impl RepositoryProvider for GitHubClient {
    #[instrument(skip(self, token))]
    async fn validate_access(
        &self,
        full_name: &str,
        token: &str,
    ) -> Result<GitHubRepository, ProviderError> {
        let url = self.repo_url(full_name, &[])?;
        self.get_json("validate_access", full_name, url, token).await
    }

    #[instrument(skip(self, token))]
    async fn fetch_commits(
        &self,
        full_name: &str,
        token: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<GitHubCommit>, ProviderError> {
        let since = since.to_rfc3339();
        let url = self.listing_url(full_name, "commits", &[("since", since.as_str())])?;
        self.get_json("fetch_commits", full_name, url, token).await
    }

    #[instrument(skip(self, token))]
    async fn fetch_pull_requests(
        &self,
        full_name: &str,
        token: &str,
    ) -> Result<Vec<GitHubPullRequest>, ProviderError> {
        let (mut open, closed) = self
            .fetch_open_and_recently_closed::<GitHubPullRequest>(
                full_name,
                token,
                "pulls",
                ("fetch_open_pull_requests", "fetch_closed_pull_requests"),
            )
            .await?;

        let now = Utc::now();
        open.extend(
            closed
                .into_iter()
                .filter(|pr| closed_within(pr.closed_at, pr.created_at, now, self.closed_window)),
        );
        Ok(open)
    }

    #[instrument(skip(self, token))]
    async fn fetch_issues(
        &self,
        full_name: &str,
        token: &str,
    ) -> Result<Vec<GitHubIssue>, ProviderError> {
        let (open, closed) = self
            .fetch_open_and_recently_closed::<GitHubIssue>(
                full_name,
                token,
                "issues",
                ("fetch_open_issues", "fetch_closed_issues"),
            )
            .await?;

        // The issues endpoint also lists pull requests
        let now = Utc::now();
        let mut issues: Vec<GitHubIssue> = open
            .into_iter()
            .filter(|issue| issue.pull_request.is_none())
            .collect();
        issues.extend(closed.into_iter().filter(|issue| {
            issue.pull_request.is_none()
                && closed_within(issue.closed_at, issue.created_at, now, self.closed_window)
        }));
        Ok(issues)
    }
}

/// Splits `owner/repo`, rejecting anything else.
pub fn split_full_name(full_name: &str) -> Result<(&str, &str), ProviderError> {
    match full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok((owner, repo))
        }
        _ => Err(ProviderError::InvalidRepositoryName(full_name.to_string())),
    }
}

/// True when `closed_at` (or `created_at` if the provider omitted it) falls inside
/// the trailing `window` ending at `now`.
pub fn closed_within(
    closed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window: ChronoDuration,
) -> bool {
    match now.checked_sub_signed(window) {
        Some(cutoff) => closed_at.unwrap_or(created_at) >= cutoff,
        // The window reaches back past every representable timestamp
        None => true,
    }
}

fn describe(operation: &str, full_name: &str) -> String {
    format!("{operation} for {full_name}")
}

// GitHub API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRepository {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubUser {
    pub login: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommit {
    pub sha: String,
    pub commit: GitHubCommitDetail,
    /// Linked GitHub account, absent for unknown emails
    #[serde(default)]
    pub author: Option<GitHubUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubCommitDetail {
    pub message: String,
    #[serde(default)]
    pub author: Option<GitHubGitActor>,
    #[serde(default)]
    pub committer: Option<GitHubGitActor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubGitActor {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubPullRequest {
    pub number: i64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubIssue {
    pub number: i64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub user: Option<GitHubUser>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    /// Present only when the "issue" is really a pull request
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}
