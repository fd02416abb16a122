//! Integration tests for the repository connection store against SQLite.

mod test_utils;

use std::time::Duration;

use chrono::Utc;
use repo_sync::models::{Commit, IssueState, PullRequest, PullRequestState, RepositoryIssue, SyncStatus};
use repo_sync::repositories::{
    NewRepositoryConnection, RepositoryConnectionUpdate, RepositoryStore, StoreError,
    SyncDataUpdate,
};
use test_utils::setup_test_db_arc;
use uuid::Uuid;

fn new_connection(user_id: Uuid, full_name: &str) -> NewRepositoryConnection {
    NewRepositoryConnection {
        user_id,
        full_name: full_name.to_string(),
        access_token: "v1:00:00:00:00".to_string(),
        is_active: true,
        sync_status: SyncStatus::Pending,
    }
}

async fn store() -> RepositoryStore {
    RepositoryStore::new(setup_test_db_arc().await.expect("database"))
}

fn sample_commit(sha: &str) -> Commit {
    Commit {
        sha: sha.to_string(),
        message: "Fix flaky test".to_string(),
        author: "Mona".to_string(),
        date: Utc::now(),
        embedding_id: None,
    }
}

#[tokio::test]
async fn test_create_starts_pending_with_empty_collections() {
    let store = store().await;
    let user_id = Uuid::new_v4();

    let record = store
        .create(new_connection(user_id, "acme/widgets"))
        .await
        .expect("created");

    assert_eq!(record.user_id, user_id);
    assert_eq!(record.full_name, "acme/widgets");
    assert!(record.is_active);
    assert_eq!(record.sync_status, SyncStatus::Pending);
    assert!(record.sync_error.is_none());
    assert!(record.last_sync_time.is_none());
    assert!(record.commits.0.is_empty());
    assert!(record.pull_requests.0.is_empty());
    assert!(record.issues.0.is_empty());
}

#[tokio::test]
async fn test_full_name_is_unique_across_users() {
    let store = store().await;
    store
        .create(new_connection(Uuid::new_v4(), "acme/widgets"))
        .await
        .expect("first connection");

    let err = store
        .create(new_connection(Uuid::new_v4(), "acme/widgets"))
        .await
        .expect_err("second connection of the same repository");
    assert!(matches!(err, StoreError::Duplicate(name) if name == "acme/widgets"));
}

#[tokio::test]
async fn test_create_rejects_malformed_input() {
    let store = store().await;

    let err = store
        .create(new_connection(Uuid::new_v4(), "not-a-repo"))
        .await
        .expect_err("missing owner");
    assert!(matches!(err, StoreError::Validation(_)));

    let mut empty_token = new_connection(Uuid::new_v4(), "acme/widgets");
    empty_token.access_token = String::new();
    let err = store.create(empty_token).await.expect_err("empty token");
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn test_reads_never_expose_the_token_but_token_lookup_does() {
    let store = store().await;
    let record = store
        .create(new_connection(Uuid::new_v4(), "acme/widgets"))
        .await
        .unwrap();

    let token = store.find_access_token(record.id).await.unwrap();
    assert_eq!(token.as_deref(), Some("v1:00:00:00:00"));
    assert!(store.find_access_token(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_find_by_user_is_scoped_and_ordered_by_recent_update() {
    let store = store().await;
    let owner = Uuid::new_v4();

    let first = store.create(new_connection(owner, "acme/one")).await.unwrap();
    let second = store.create(new_connection(owner, "acme/two")).await.unwrap();
    store
        .create(new_connection(Uuid::new_v4(), "other/repo"))
        .await
        .unwrap();

    // Touch the older record so it becomes the most recently updated
    tokio::time::sleep(Duration::from_millis(5)).await;
    store
        .update(
            first.id,
            RepositoryConnectionUpdate {
                is_active: Some(false),
                access_token: None,
            },
        )
        .await
        .unwrap();

    let listed = store.find_by_user_id(owner).await.unwrap();
    let ids: Vec<Uuid> = listed.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn test_find_all_active_puts_never_synced_first() {
    let store = store().await;
    let user = Uuid::new_v4();

    let synced = store.create(new_connection(user, "acme/synced")).await.unwrap();
    let fresh = store.create(new_connection(user, "acme/fresh")).await.unwrap();
    let inactive = store.create(new_connection(user, "acme/inactive")).await.unwrap();

    store
        .update_sync_data(synced.id, SyncDataUpdate::success(vec![], vec![], vec![]))
        .await
        .unwrap();
    store
        .update(
            inactive.id,
            RepositoryConnectionUpdate {
                is_active: Some(false),
                access_token: None,
            },
        )
        .await
        .unwrap();

    let active: Vec<Uuid> = store
        .find_all_active()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(active, vec![fresh.id, synced.id]);
}

#[tokio::test]
async fn test_update_sync_data_success_replaces_collections() {
    let store = store().await;
    let record = store
        .create(new_connection(Uuid::new_v4(), "acme/widgets"))
        .await
        .unwrap();

    let pull = PullRequest {
        number: 7,
        title: "Add retries".to_string(),
        state: PullRequestState::Merged,
        author: "octocat".to_string(),
        created_at: Utc::now(),
        merged_at: Some(Utc::now()),
    };
    let issue = RepositoryIssue {
        number: 3,
        title: "Crash on start".to_string(),
        state: IssueState::Open,
        author: "hubot".to_string(),
        created_at: Utc::now(),
        closed_at: None,
    };

    let updated = store
        .update_sync_data(
            record.id,
            SyncDataUpdate::success(
                vec![sample_commit("a1"), sample_commit("b2")],
                vec![pull.clone()],
                vec![issue.clone()],
            ),
        )
        .await
        .unwrap();

    assert_eq!(updated.sync_status, SyncStatus::Success);
    assert!(updated.last_sync_time.is_some());
    assert_eq!(updated.commits.0.len(), 2);
    assert_eq!(updated.pull_requests.0, vec![pull]);
    assert_eq!(updated.issues.0, vec![issue]);

    // A second sync replaces rather than appends
    let resynced = store
        .update_sync_data(
            record.id,
            SyncDataUpdate::success(vec![sample_commit("c3")], vec![], vec![]),
        )
        .await
        .unwrap();
    assert_eq!(resynced.commits.0.len(), 1);
    assert_eq!(resynced.commits.0[0].sha, "c3");
    assert!(resynced.pull_requests.0.is_empty());
}

#[tokio::test]
async fn test_failed_sync_keeps_previous_data_and_success_clears_error() {
    let store = store().await;
    let record = store
        .create(new_connection(Uuid::new_v4(), "acme/widgets"))
        .await
        .unwrap();

    store
        .update_sync_data(
            record.id,
            SyncDataUpdate::success(vec![sample_commit("a1")], vec![], vec![]),
        )
        .await
        .unwrap();

    let failed = store
        .update_sync_data(record.id, SyncDataUpdate::failed("GitHub unavailable"))
        .await
        .unwrap();
    assert_eq!(failed.sync_status, SyncStatus::Failed);
    assert_eq!(failed.sync_error.as_deref(), Some("GitHub unavailable"));
    assert_eq!(failed.commits.0.len(), 1);

    let recovered = store
        .update_sync_data(record.id, SyncDataUpdate::success(vec![], vec![], vec![]))
        .await
        .unwrap();
    assert_eq!(recovered.sync_status, SyncStatus::Success);
    assert!(recovered.sync_error.is_none());
}

#[tokio::test]
async fn test_update_sync_data_on_deleted_record_is_not_found() {
    let store = store().await;
    let record = store
        .create(new_connection(Uuid::new_v4(), "acme/widgets"))
        .await
        .unwrap();
    store.delete(record.id).await.unwrap();

    let err = store
        .update_sync_data(record.id, SyncDataUpdate::failed("late write"))
        .await
        .expect_err("record is gone");
    assert!(matches!(err, StoreError::NotFound(id) if id == record.id));
    assert!(store.find_by_id(record.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_unknown_id_is_not_found() {
    let store = store().await;
    let missing = Uuid::new_v4();
    let err = store.delete(missing).await.expect_err("nothing to delete");
    assert!(matches!(err, StoreError::NotFound(id) if id == missing));
}

#[tokio::test]
async fn test_update_changes_token_and_activity() {
    let store = store().await;
    let record = store
        .create(new_connection(Uuid::new_v4(), "acme/widgets"))
        .await
        .unwrap();

    let updated = store
        .update(
            record.id,
            RepositoryConnectionUpdate {
                is_active: Some(false),
                access_token: Some("v1:11:11:11:11".to_string()),
            },
        )
        .await
        .unwrap();

    assert!(!updated.is_active);
    assert!(updated.updated_at >= record.updated_at);
    assert_eq!(
        store.find_access_token(record.id).await.unwrap().as_deref(),
        Some("v1:11:11:11:11")
    );

    let err = store
        .update(Uuid::new_v4(), RepositoryConnectionUpdate::default())
        .await
        .expect_err("unknown id");
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_replace_access_token_and_bulk_listing() {
    let store = store().await;
    let user = Uuid::new_v4();
    let a = store.create(new_connection(user, "acme/a")).await.unwrap();
    let b = store.create(new_connection(user, "acme/b")).await.unwrap();

    store
        .replace_access_token(b.id, "v1:22:22:22:22".to_string())
        .await
        .unwrap();

    let tokens = store.find_all_access_tokens().await.unwrap();
    assert_eq!(tokens.len(), 2);
    assert!(tokens.contains(&(a.id, "v1:00:00:00:00".to_string())));
    assert!(tokens.contains(&(b.id, "v1:22:22:22:22".to_string())));

    let err = store
        .replace_access_token(Uuid::new_v4(), "v1:33:33:33:33".to_string())
        .await
        .expect_err("unknown id");
    assert!(matches!(err, StoreError::NotFound(_)));
}
