//! Dispatch / reconciliation loop.
//!
//! Walks the pending accounts once, in load order, admitting each into the
//! pool as capacity allows and pacing admissions by a fixed interval. Once
//! every account has had its turn the loop waits for the pool to drain.
//! Accounts that fail to launch stay pending for the next run; there is no
//! retry within a run.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::supervisor::{Admission, Supervisor};

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Delay after each launch attempt.
    pub admission_interval: Duration,
}

/// Totals for one pass of the dispatch loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub launched: usize,
    pub failed: usize,
    /// Accounts reclassified before their turn came.
    pub skipped: usize,
}

/// Run one full dispatch pass and wait for every job to finish.
pub async fn run(supervisor: &Supervisor, config: &DispatchConfig) -> DispatchSummary {
    let pending = supervisor.pending_accounts().await;
    tracing::info!(
        pending = pending.len(),
        ceiling = supervisor.ceiling(),
        interval_ms = config.admission_interval.as_millis() as u64,
        "Starting dispatch",
    );

    let mut summary = DispatchSummary::default();
    'accounts: for account in pending {
        loop {
            supervisor.wait_for_capacity().await;
            match supervisor.admit(&account).await {
                Admission::Launched(_) => {
                    summary.launched += 1;
                    break;
                }
                Admission::Failed(e) => {
                    tracing::error!(account = %account, error = %e, "Failed to launch verification job, account stays pending");
                    summary.failed += 1;
                    break;
                }
                Admission::NotPending => {
                    tracing::debug!(account = %account, "Account already classified, skipping");
                    summary.skipped += 1;
                    continue 'accounts;
                }
                // Another admission took the slot between the wake and the
                // lock.
                Admission::AtCapacity => continue,
            }
        }

        tokio::time::sleep(config.admission_interval).await;
    }

    tracing::info!(
        launched = summary.launched,
        failed = summary.failed,
        skipped = summary.skipped,
        "All accounts dispatched, waiting for live jobs to drain",
    );
    supervisor.wait_until_drained().await;
    tracing::info!("Verification run finished");
    summary
}

/// Log live/pending counts every `interval` until cancelled.
pub fn spawn_stats_reporter(
    supervisor: Supervisor,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let live = supervisor.live_jobs().await;
                    let counts = supervisor.counts().await;
                    tracing::info!(
                        live,
                        ceiling = supervisor.ceiling(),
                        pending = counts.pending,
                        verified = counts.verified,
                        blocked = counts.blocked,
                        "Verification stats",
                    );
                }
            }
        }
    })
}
