//! Value types embedded in a repository connection.
//!
//! These are the internal shapes commits, pull requests and issues are stored
//! in after a sync. They are replaced wholesale on every successful sync.

use chrono::{DateTime, Utc};
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A commit pulled from the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Commit {
    pub sha: String,
    pub message: String,
    /// Display name of the commit author.
    pub author: String,
    pub date: DateTime<Utc>,
    /// Reserved for semantic search indexing. Sync never sets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

/// A pull request pulled from the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PullRequest {
    pub number: i64,
    pub title: String,
    pub state: PullRequestState,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

/// A provider issue. Unrelated to project-management issues.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RepositoryIssue {
    pub number: i64,
    pub title: String,
    pub state: IssueState,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct CommitList(pub Vec<Commit>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct PullRequestList(pub Vec<PullRequest>);

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(transparent)]
pub struct IssueList(pub Vec<RepositoryIssue>);

impl From<Vec<Commit>> for CommitList {
    fn from(items: Vec<Commit>) -> Self {
        Self(items)
    }
}

impl From<Vec<PullRequest>> for PullRequestList {
    fn from(items: Vec<PullRequest>) -> Self {
        Self(items)
    }
}

impl From<Vec<RepositoryIssue>> for IssueList {
    fn from(items: Vec<RepositoryIssue>) -> Self {
        Self(items)
    }
}
