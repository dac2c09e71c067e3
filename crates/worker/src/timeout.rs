//! Optional job timeout sweep.
//!
//! Disabled unless `OSVERIFY_JOB_TIMEOUT_SECS` is set. When enabled, every
//! [`SWEEP_INTERVAL`] the sweep terminates jobs older than the timeout and
//! blocks their accounts with reason `TIMEOUT`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::supervisor::Supervisor;

/// How often live jobs are checked against the timeout.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub fn spawn_timeout_sweep(
    supervisor: Supervisor,
    timeout: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(timeout_secs = timeout.as_secs(), "Job timeout sweep enabled");
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = supervisor.expire_jobs(timeout).await;
                    if !expired.is_empty() {
                        tracing::info!(count = expired.len(), "Blocked timed-out accounts");
                    }
                }
            }
        }
    })
}
