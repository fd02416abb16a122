//! Connectors module
//!
//! Source-control provider access:
//! - The `RepositoryProvider` trait the sync orchestrator depends on
//! - The GitHub REST client implementing it
//! - The retry/backoff policy every provider call runs under

pub mod github;
pub mod retry;
pub mod trait_;

pub use github::{GitHubClient, GitHubCommit, GitHubIssue, GitHubPullRequest, GitHubRepository};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use trait_::{ProviderError, RepositoryProvider};
