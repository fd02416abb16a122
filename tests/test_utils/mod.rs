//! Shared fixtures for integration tests: an in-memory SQLite database with
//! migrations applied, a GitHub client pointed at a wiremock server, and a
//! sleeper that records backoff delays instead of waiting.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use repo_sync::config::{AppConfig, GitHubClientConfig, RetryPolicyConfig, SyncWindowConfig};
use repo_sync::connectors::{GitHubClient, RetryPolicy, Sleeper};
use repo_sync::crypto::TokenCipher;
use repo_sync::repositories::RepositoryStore;
use repo_sync::server::AppState;
use repo_sync::sync_service::RepositorySyncService;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_TOKEN_SECRET: &str = "integration-test-token-secret";
pub const TEST_JWT_SECRET: &str = "integration-test-jwt-secret-0123456789";
pub const GITHUB_TOKEN: &str = "ghp_integration_token";

/// Sets up an in-memory SQLite database with all migrations applied.
///
/// The pool is pinned to one connection; each SQLite in-memory connection
/// would otherwise see its own empty database.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    Ok(db)
}

pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Records every backoff delay and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

pub fn test_config(github_base: &str) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".to_string(),
        token_secret: Some(TEST_TOKEN_SECRET.to_string()),
        jwt_secret: Some(TEST_JWT_SECRET.to_string()),
        github: GitHubClientConfig {
            api_base_url: github_base.to_string(),
            request_timeout_seconds: 5,
            ..GitHubClientConfig::default()
        },
        retry: RetryPolicyConfig {
            max_attempts: 3,
            base_delay_seconds: 30,
        },
        ..AppConfig::default()
    }
}

pub fn github_client(server: &MockServer, sleeper: Arc<RecordingSleeper>) -> GitHubClient {
    let config = test_config(&server.uri());
    GitHubClient::new(
        &config.github,
        &SyncWindowConfig::default(),
        RetryPolicy::from(&config.retry),
    )
    .expect("GitHub client builds")
    .with_sleeper(sleeper)
}

pub fn test_cipher() -> Arc<TokenCipher> {
    Arc::new(TokenCipher::new(TEST_TOKEN_SECRET).expect("cipher"))
}

/// A sync service over a fresh database and a mocked GitHub.
pub async fn sync_service(
    server: &MockServer,
    sleeper: Arc<RecordingSleeper>,
) -> Result<(RepositorySyncService, RepositoryStore)> {
    let db = setup_test_db_arc().await?;
    let store = RepositoryStore::new(db);
    let service = RepositorySyncService::new(
        store.clone(),
        test_cipher(),
        Arc::new(github_client(server, sleeper)),
        &SyncWindowConfig::default(),
    );
    Ok((service, store))
}

/// Application state for router tests.
pub async fn app_state(server: &MockServer) -> Result<AppState> {
    let config = Arc::new(test_config(&server.uri()));
    let db = setup_test_db_arc().await?;
    let provider = Arc::new(github_client(server, Arc::default()));
    Ok(AppState::with_provider(config, db, provider)?)
}

// GitHub payload builders

pub fn repository_json(full_name: &str) -> Value {
    let name = full_name.split('/').nth(1).unwrap_or(full_name);
    json!({ "name": name, "full_name": full_name, "private": true })
}

pub fn commit_json(sha: &str, author: &str, date: DateTime<Utc>) -> Value {
    json!({
        "sha": sha,
        "commit": {
            "message": format!("commit {sha}"),
            "author": { "name": author, "date": date.to_rfc3339() },
            "committer": { "name": author, "date": date.to_rfc3339() }
        },
        "author": { "login": author.to_lowercase() }
    })
}

pub fn pull_json(
    number: i64,
    state: &str,
    closed_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
) -> Value {
    json!({
        "number": number,
        "title": format!("PR #{number}"),
        "state": state,
        "user": { "login": "octocat" },
        "created_at": (Utc::now() - chrono::Duration::days(60)).to_rfc3339(),
        "closed_at": closed_at.map(|ts| ts.to_rfc3339()),
        "merged_at": merged_at.map(|ts| ts.to_rfc3339()),
    })
}

pub fn issue_json(number: i64, state: &str, closed_at: Option<DateTime<Utc>>) -> Value {
    json!({
        "number": number,
        "title": format!("Issue #{number}"),
        "state": state,
        "user": { "login": "hubot" },
        "created_at": (Utc::now() - chrono::Duration::days(90)).to_rfc3339(),
        "closed_at": closed_at.map(|ts| ts.to_rfc3339()),
    })
}

pub async fn mount_repository(server: &MockServer, full_name: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{full_name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(repository_json(full_name)))
        .mount(server)
        .await;
}

pub async fn mount_listing(
    server: &MockServer,
    full_name: &str,
    endpoint: &str,
    state: &str,
    body: Value,
) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{full_name}/{endpoint}")))
        .and(query_param("state", state))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts healthy responses for every sync endpoint of `full_name`:
/// two commits, one open and one merged PR, one open issue.
pub async fn mount_healthy_repository(server: &MockServer, full_name: &str) {
    let now = Utc::now();
    mount_repository(server, full_name).await;

    Mock::given(method("GET"))
        .and(path(format!("/repos/{full_name}/commits")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            commit_json("a1", "Mona", now - chrono::Duration::days(1)),
            commit_json("b2", "Hubot", now - chrono::Duration::days(2)),
        ])))
        .mount(server)
        .await;

    let merged = now - chrono::Duration::days(3);
    mount_listing(server, full_name, "pulls", "open", json!([pull_json(1, "open", None, None)]))
        .await;
    mount_listing(
        server,
        full_name,
        "pulls",
        "closed",
        json!([pull_json(2, "closed", Some(merged), Some(merged))]),
    )
    .await;
    mount_listing(server, full_name, "issues", "open", json!([issue_json(10, "open", None)]))
        .await;
    mount_listing(server, full_name, "issues", "closed", json!([])).await;
}
