//! GitHub client behavior against a mocked API: retry policy, error mapping
//! and the closed-item window.

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use repo_sync::connectors::{ProviderError, RepositoryProvider};
use serde_json::json;
use test_utils::{
    GITHUB_TOKEN, RecordingSleeper, github_client, issue_json, mount_listing, pull_json,
    repository_json,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPO: &str = "acme/widgets";

#[tokio::test]
async fn test_transient_errors_back_off_exponentially_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repository_json(REPO)))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let client = github_client(&server, Arc::clone(&sleeper));

    let repo = client
        .validate_access(REPO, GITHUB_TOKEN)
        .await
        .expect("third attempt succeeds");
    assert_eq!(repo.full_name, REPO);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(30), Duration::from_secs(60)]
    );
}

#[tokio::test]
async fn test_unauthorized_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let client = github_client(&server, Arc::clone(&sleeper));

    let err = client
        .validate_access(REPO, GITHUB_TOKEN)
        .await
        .expect_err("401 is fatal");
    assert!(matches!(err, ProviderError::AuthenticationFailure));
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn test_persistent_forbidden_becomes_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets"))
        .respond_with(ResponseTemplate::new(403))
        .expect(3)
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let client = github_client(&server, Arc::clone(&sleeper));

    let err = client
        .validate_access(REPO, GITHUB_TOKEN)
        .await
        .expect_err("403 on every attempt");
    assert!(matches!(err, ProviderError::RateLimitedOrForbidden { .. }));
    assert_eq!(sleeper.delays().len(), 2);
}

#[tokio::test]
async fn test_exhausted_server_errors_report_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets/commits"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let client = github_client(&server, Arc::default());
    let err = client
        .fetch_commits(REPO, GITHUB_TOKEN, Utc::now() - ChronoDuration::days(7))
        .await
        .expect_err("every attempt fails");

    match err {
        ProviderError::ExternalServiceUnavailable {
            operation,
            attempts,
            ..
        } => {
            assert!(operation.contains("fetch_commits"));
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/widgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repository_json(REPO)))
        .mount(&server)
        .await;

    let sleeper = Arc::new(RecordingSleeper::default());
    let client = github_client(&server, Arc::clone(&sleeper));

    client
        .validate_access(REPO, GITHUB_TOKEN)
        .await
        .expect("second attempt parses");
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(30)]);
}

#[tokio::test]
async fn test_pull_requests_include_open_and_recently_closed() {
    let server = MockServer::start().await;
    let now = Utc::now();
    let recent = now - ChronoDuration::days(29);
    let old = now - ChronoDuration::days(31);

    mount_listing(
        &server,
        REPO,
        "pulls",
        "open",
        json!([pull_json(1, "open", None, None)]),
    )
    .await;
    mount_listing(
        &server,
        REPO,
        "pulls",
        "closed",
        json!([
            pull_json(2, "closed", Some(recent), Some(recent)),
            pull_json(3, "closed", Some(old), None),
        ]),
    )
    .await;

    let client = github_client(&server, Arc::default());
    let pulls = client
        .fetch_pull_requests(REPO, GITHUB_TOKEN)
        .await
        .expect("pull requests");

    let numbers: Vec<i64> = pulls.iter().map(|pr| pr.number).collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn test_issues_skip_pull_requests_and_stale_closed_items() {
    let server = MockServer::start().await;
    let now = Utc::now();

    let mut pr_as_issue = issue_json(5, "open", None);
    pr_as_issue["pull_request"] = json!({ "url": "https://api.github.com/repos/acme/widgets/pulls/5" });

    mount_listing(
        &server,
        REPO,
        "issues",
        "open",
        json!([issue_json(4, "open", None), pr_as_issue]),
    )
    .await;
    mount_listing(
        &server,
        REPO,
        "issues",
        "closed",
        json!([
            issue_json(6, "closed", Some(now - ChronoDuration::days(29))),
            issue_json(7, "closed", Some(now - ChronoDuration::days(31))),
        ]),
    )
    .await;

    let client = github_client(&server, Arc::default());
    let issues = client
        .fetch_issues(REPO, GITHUB_TOKEN)
        .await
        .expect("issues");

    let numbers: Vec<i64> = issues.iter().map(|issue| issue.number).collect();
    // Open issues are kept regardless of age
    assert_eq!(numbers, vec![4, 6]);
}

#[tokio::test]
async fn test_unknown_repository_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/missing/pulls"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = github_client(&server, Arc::default());
    let err = client
        .fetch_pull_requests("acme/missing", GITHUB_TOKEN)
        .await
        .expect_err("repository missing");
    assert!(matches!(err, ProviderError::ResourceNotFound { .. }));
}
