mod test_utils;

use std::sync::Arc;

use repo_sync::config::SweeperConfig;
use repo_sync::models::SyncStatus;
use repo_sync::repositories::{NewRepositoryConnection, RepositoryConnectionUpdate};
use repo_sync::sweeper::{SweepStats, SyncSweeper};
use test_utils::{GITHUB_TOKEN, mount_healthy_repository, mount_repository, sync_service, test_cipher};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_sweep_syncs_active_skips_busy_and_counts_failures() {
    let server = MockServer::start().await;
    mount_healthy_repository(&server, "acme/healthy").await;
    mount_repository(&server, "acme/broken").await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/broken/commits"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/broken/pulls"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/acme/broken/issues"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (service, store) = sync_service(&server, Arc::default()).await.unwrap();
    let user = Uuid::new_v4();
    let healthy = service
        .connect_repository(user, "acme/healthy", GITHUB_TOKEN)
        .await
        .unwrap();
    let broken = service
        .connect_repository(user, "acme/broken", GITHUB_TOKEN)
        .await
        .unwrap();

    // Held by another attempt
    store
        .create(NewRepositoryConnection {
            user_id: user,
            full_name: "acme/busy".to_string(),
            access_token: test_cipher().encrypt(GITHUB_TOKEN).unwrap(),
            is_active: true,
            sync_status: SyncStatus::Syncing,
        })
        .await
        .unwrap();

    // Not a sweep candidate at all
    let inactive = store
        .create(NewRepositoryConnection {
            user_id: user,
            full_name: "acme/inactive".to_string(),
            access_token: test_cipher().encrypt(GITHUB_TOKEN).unwrap(),
            is_active: true,
            sync_status: SyncStatus::Pending,
        })
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

    let sweeper = SyncSweeper::new(service.clone(), &SweeperConfig::default());
    let stats = sweeper
        .sweep_once(&CancellationToken::new())
        .await
        .expect("sweep runs");

    assert_eq!(
        stats,
        SweepStats {
            attempted: 3,
            succeeded: 1,
            failed: 1,
            skipped: 1,
        }
    );

    let healthy = store.find_by_id(healthy.id).await.unwrap().unwrap();
    assert_eq!(healthy.sync_status, SyncStatus::Success);
    let broken = store.find_by_id(broken.id).await.unwrap().unwrap();
    assert_eq!(broken.sync_status, SyncStatus::Failed);
    let inactive = store.find_by_id(inactive.id).await.unwrap().unwrap();
    assert_eq!(inactive.sync_status, SyncStatus::Pending);
}

#[tokio::test]
async fn test_cancelled_sweep_attempts_nothing() {
    let server = MockServer::start().await;
    mount_healthy_repository(&server, "acme/healthy").await;
    let (service, _store) = sync_service(&server, Arc::default()).await.unwrap();
    service
        .connect_repository(Uuid::new_v4(), "acme/healthy", GITHUB_TOKEN)
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let sweeper = SyncSweeper::new(service, &SweeperConfig::default());
    let stats = sweeper.sweep_once(&shutdown).await.unwrap();
    assert_eq!(stats, SweepStats::default());
}

#[tokio::test]
async fn test_run_returns_once_shutdown_fires() {
    let server = MockServer::start().await;
    let (service, _store) = sync_service(&server, Arc::default()).await.unwrap();

    let shutdown = CancellationToken::new();
    let sweeper = SyncSweeper::new(service, &SweeperConfig::default());
    let handle = tokio::spawn(sweeper.run(shutdown.clone()));

    shutdown.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("sweeper stops promptly")
        .expect("sweeper task does not panic");
}
