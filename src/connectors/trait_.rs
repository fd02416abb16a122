//! Provider trait definition
//!
//! The interface the sync orchestrator uses to reach a source-control provider.
//! [`GitHubClient`](super::github::GitHubClient) is the production
//! implementation; tests substitute their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use super::github::{GitHubCommit, GitHubIssue, GitHubPullRequest, GitHubRepository};

/// Failures surfaced by provider calls after the retry policy has run.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 401: the token is invalid or expired. Never retried.
    #[error("GitHub rejected the access token")]
    AuthenticationFailure,

    /// 404: repository missing or not visible to the token. Never retried.
    #[error("GitHub resource not found: {resource}")]
    ResourceNotFound { resource: String },

    /// 403/429 on the final attempt.
    #[error("GitHub rate limited or forbade {operation}")]
    RateLimitedOrForbidden { operation: String },

    /// Every attempt failed with a retryable error.
    #[error("GitHub unavailable: {operation} failed after {attempts} attempts ({last_error})")]
    ExternalServiceUnavailable {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("invalid repository name '{0}', expected 'owner/repo'")]
    InvalidRepositoryName(String),

    #[error("GitHub client misconfigured: {0}")]
    Configuration(String),
}

/// Read access to one repository's activity on a source-control provider.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    /// Pre-flight check that `token` can read `full_name`.
    async fn validate_access(
        &self,
        full_name: &str,
        token: &str,
    ) -> Result<GitHubRepository, ProviderError>;

    /// Commits authored since `since`.
    async fn fetch_commits(
        &self,
        full_name: &str,
        token: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<GitHubCommit>, ProviderError>;

    /// Open pull requests plus recently closed ones.
    async fn fetch_pull_requests(
        &self,
        full_name: &str,
        token: &str,
    ) -> Result<Vec<GitHubPullRequest>, ProviderError>;

    /// Open issues plus recently closed ones, pull requests excluded.
    async fn fetch_issues(
        &self,
        full_name: &str,
        token: &str,
    ) -> Result<Vec<GitHubIssue>, ProviderError>;
}
