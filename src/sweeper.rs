//! # Sync Sweeper
//!
//! Background task that periodically syncs every active repository connection,
//! stalest first, one at a time. Records already being synced elsewhere are
//! skipped. Stops when the shutdown token fires.

use std::time::Duration;

use metrics::{counter, gauge, histogram};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SweeperConfig;
use crate::sync_service::{RepositorySyncService, SyncServiceError};

/// Per-sweep tallies.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

pub struct SyncSweeper {
    service: RepositorySyncService,
    interval: Duration,
}

impl SyncSweeper {
    pub fn new(service: RepositorySyncService, config: &SweeperConfig) -> Self {
        Self {
            service,
            interval: Duration::from_secs(config.interval_seconds),
        }
    }

    /// Sweeps every `interval` until `shutdown` is cancelled.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_seconds = self.interval.as_secs(), "Starting sync sweeper");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Sync sweeper shutdown requested");
                    break;
                }
                _ = sleep(self.interval) => {
                    let started = Instant::now();
                    match self.sweep_once(&shutdown).await {
                        Ok(stats) => info!(
                            attempted = stats.attempted,
                            succeeded = stats.succeeded,
                            failed = stats.failed,
                            skipped = stats.skipped,
                            "Sweep finished"
                        ),
                        Err(err) => error!(error = %err, "Sweep failed"),
                    }
                    histogram!("sync_sweep_duration_seconds").record(started.elapsed().as_secs_f64());
                }
            }
        }

        info!("Sync sweeper stopped");
    }

    /// One pass over the active connections. Returns early, with partial
    /// stats, if `shutdown` fires between records.
    pub async fn sweep_once(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<SweepStats, SyncServiceError> {
        let candidates = self.service.store().find_all_active().await?;
        gauge!("sync_sweep_candidates").set(candidates.len() as f64);

        let mut stats = SweepStats::default();
        for record in candidates {
            if shutdown.is_cancelled() {
                debug!("Stopping sweep early");
                break;
            }

            stats.attempted += 1;
            match self.service.sync_repository(record.id).await {
                Ok(result) if result.success => stats.succeeded += 1,
                Ok(_) => stats.failed += 1,
                Err(
                    SyncServiceError::SyncAlreadyInProgress(_)
                    | SyncServiceError::InactiveRepository(_)
                    | SyncServiceError::NotFound(_),
                ) => {
                    // Claimed, deactivated or removed since the listing
                    stats.skipped += 1;
                    counter!("sync_sweep_skipped_total").increment(1);
                }
                Err(err) => {
                    stats.failed += 1;
                    warn!(repository_id = %record.id, error = %err, "Sweep could not sync repository");
                }
            }
        }

        Ok(stats)
    }
}
