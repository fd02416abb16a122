//! Conversion from GitHub payloads to the shapes stored on a connection.

use chrono::Utc;

use crate::connectors::github::{GitHubCommit, GitHubIssue, GitHubPullRequest, GitHubUser};
use crate::models::sync_items::{
    Commit, IssueState, PullRequest, PullRequestState, RepositoryIssue,
};

const UNKNOWN_AUTHOR: &str = "unknown";

/// `merged` iff GitHub reports the PR closed *and* carries a merge time.
pub fn derive_pull_request_state(
    raw_state: &str,
    merged_at: Option<chrono::DateTime<Utc>>,
) -> PullRequestState {
    match (raw_state, merged_at) {
        ("closed", Some(_)) => PullRequestState::Merged,
        ("closed", None) => PullRequestState::Closed,
        _ => PullRequestState::Open,
    }
}

pub fn normalize_commit(commit: GitHubCommit) -> Commit {
    let git_author = commit.commit.author.as_ref();
    let author = git_author
        .and_then(|actor| actor.name.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| commit.author.as_ref().map(|user| user.login.clone()))
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
    let date = git_author
        .and_then(|actor| actor.date)
        .or_else(|| commit.commit.committer.as_ref().and_then(|actor| actor.date))
        .unwrap_or_else(Utc::now);

    Commit {
        sha: commit.sha,
        message: commit.commit.message,
        author,
        date,
        embedding_id: None,
    }
}

pub fn normalize_pull_request(pr: GitHubPullRequest) -> PullRequest {
    PullRequest {
        number: pr.number,
        state: derive_pull_request_state(&pr.state, pr.merged_at),
        author: login_or_unknown(pr.user.as_ref()),
        title: pr.title,
        created_at: pr.created_at,
        merged_at: pr.merged_at,
    }
}

pub fn normalize_issue(issue: GitHubIssue) -> RepositoryIssue {
    let state = if issue.state == "closed" {
        IssueState::Closed
    } else {
        IssueState::Open
    };

    RepositoryIssue {
        number: issue.number,
        state,
        author: login_or_unknown(issue.user.as_ref()),
        title: issue.title,
        created_at: issue.created_at,
        closed_at: issue.closed_at,
    }
}

fn login_or_unknown(user: Option<&GitHubUser>) -> String {
    user.map(|u| u.login.clone())
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}
