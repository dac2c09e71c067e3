//! Shared orchestration state.
//!
//! [`Supervisor`] owns the [`AccountStore`] and the [`WorkerPool`] behind a
//! single mutex. The dispatch loop, the notification listener, the exit
//! reaper, and the timeout sweep only ever go through the compound
//! operations exposed here, so admission, terminate-and-reclassify, and
//! exit reaping are atomic with respect to each other.
//!
//! The live job count is published on a [`watch`] channel after every
//! mutation so waiters are woken on change instead of polling.

use std::sync::{Arc, Weak};
use std::time::Duration;

use osverify_core::account::{AccountState, Outcome, REASON_TIMEOUT};
use osverify_core::protocol::{Notification, ProtocolError};
use osverify_db::{AccountStore, DbError, StoreCounts};
use tokio::sync::{mpsc, watch, Mutex};

use crate::launcher::JobLauncher;
use crate::pool::{JobExit, JobHandle, LaunchError, WorkerPool, TERMINATE_GRACE};

/// Result of trying to admit one account into the pool.
#[derive(Debug)]
pub enum Admission {
    Launched(JobHandle),
    /// The pool was full at the instant of admission.
    AtCapacity,
    /// The account was reclassified (or is unknown) before its turn came.
    NotPending,
    /// The job could not be started; the account stays pending.
    Failed(LaunchError),
}

/// What a successfully applied notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationReport {
    pub account: String,
    pub outcome: Outcome,
    /// The live job that was terminated, if there was one.
    pub terminated: Option<JobHandle>,
}

/// Errors from processing a notification line.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("malformed notification: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("failed to reclassify account: {0}")]
    Store(#[from] DbError),
}

struct State {
    store: AccountStore,
    pool: WorkerPool,
}

struct Shared {
    state: Mutex<State>,
    ceiling: usize,
    live_tx: watch::Sender<usize>,
}

/// Cheaply cloneable handle to the orchestration state.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    /// Wrap a loaded store and start the exit reaper task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(store: AccountStore, ceiling: usize, launcher: Arc<dyn JobLauncher>) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let (live_tx, _) = watch::channel(0);

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                store,
                pool: WorkerPool::new(ceiling, launcher, exit_tx),
            }),
            ceiling,
            live_tx,
        });

        tokio::spawn(reap_exits(Arc::downgrade(&shared), exit_rx));
        Self { shared }
    }

    pub fn ceiling(&self) -> usize {
        self.shared.ceiling
    }

    /// Number of live jobs.
    pub async fn live_jobs(&self) -> usize {
        self.shared.state.lock().await.pool.size()
    }

    pub async fn live_job(&self, account: &str) -> Option<JobHandle> {
        self.shared.state.lock().await.pool.get(account).cloned()
    }

    /// Pending account names in load order.
    pub async fn pending_accounts(&self) -> Vec<String> {
        self.shared.state.lock().await.store.pending_names()
    }

    pub async fn account_state(&self, account: &str) -> Option<AccountState> {
        self.shared.state.lock().await.store.state(account).cloned()
    }

    pub async fn counts(&self) -> StoreCounts {
        self.shared.state.lock().await.store.counts()
    }

    /// Subscribe to the live job count.
    pub fn subscribe_live(&self) -> watch::Receiver<usize> {
        self.shared.live_tx.subscribe()
    }

    /// Launch a job for `account` if it is still pending and the pool has
    /// room.
    pub async fn admit(&self, account: &str) -> Admission {
        let mut state = self.shared.state.lock().await;
        let State { store, pool } = &mut *state;

        let Some(credential) = store.pending_credential(account) else {
            return Admission::NotPending;
        };

        let admission = match pool.launch(account, credential) {
            Ok(handle) => Admission::Launched(handle),
            Err(LaunchError::AtCapacity { .. }) => Admission::AtCapacity,
            Err(e) => Admission::Failed(e),
        };
        self.publish(pool);
        admission
    }

    /// Terminate the live job for `account`, if any.
    pub async fn terminate(&self, account: &str) -> Option<JobHandle> {
        let mut state = self.shared.state.lock().await;
        let handle = state.pool.terminate(account);
        self.publish(&state.pool);
        handle
    }

    /// Parse and apply one control-channel line.
    pub async fn handle_line(&self, line: &str) -> Result<NotificationReport, NotificationError> {
        let notification = Notification::parse(line)?;
        self.handle_notification(&notification).await
    }

    /// Terminate the account's live job (if any) and reclassify it, as one
    /// atomic step.
    pub async fn handle_notification(
        &self,
        notification: &Notification,
    ) -> Result<NotificationReport, NotificationError> {
        let mut state = self.shared.state.lock().await;
        let report = apply_notification(&mut state, notification).await;
        self.publish(&state.pool);
        report
    }

    /// Block every account whose job has outlived `timeout`.
    pub async fn expire_jobs(&self, timeout: Duration) -> Vec<NotificationReport> {
        let mut state = self.shared.state.lock().await;
        let expired = state.pool.expired(tokio::time::Instant::now(), timeout);

        let mut reports = Vec::with_capacity(expired.len());
        for account in expired {
            tracing::warn!(account = %account, timeout_secs = timeout.as_secs(), "Verification job timed out");
            let notification = Notification::internal(account, REASON_TIMEOUT);
            match apply_notification(&mut state, &notification).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(account = %notification.account, error = %e, "Failed to block timed-out account");
                }
            }
        }
        self.publish(&state.pool);
        reports
    }

    /// Wait until the pool has room for another job.
    pub async fn wait_for_capacity(&self) {
        let ceiling = self.shared.ceiling;
        let mut rx = self.shared.live_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|live| *live < ceiling).await;
    }

    /// Wait until no jobs are live.
    pub async fn wait_until_drained(&self) {
        let mut rx = self.shared.live_tx.subscribe();
        let _ = rx.wait_for(|live| *live == 0).await;
    }

    /// Terminate every live job and give the processes up to
    /// [`TERMINATE_GRACE`] to exit. Returns how many jobs were terminated.
    pub async fn shutdown(&self) -> usize {
        let (terminated, watchers) = {
            let mut state = self.shared.state.lock().await;
            let terminated = state.pool.terminate_all();
            self.publish(&state.pool);
            (terminated, state.pool.watchers())
        };

        watchers.close();
        let grace = TERMINATE_GRACE + Duration::from_secs(1);
        if tokio::time::timeout(grace, watchers.wait()).await.is_err() {
            tracing::warn!("Timed out waiting for terminated jobs to exit");
        }
        terminated
    }

    fn publish(&self, pool: &WorkerPool) {
        self.shared.live_tx.send_replace(pool.size());
    }
}

async fn apply_notification(
    state: &mut State,
    notification: &Notification,
) -> Result<NotificationReport, NotificationError> {
    let account = notification.account.as_str();
    let outcome = notification.outcome();

    let terminated = state.pool.terminate(account);
    if let Some(job) = &terminated {
        tracing::info!(
            account = %account,
            job_id = job.id,
            action = %notification.action,
            "Terminated job on notification",
        );
    }

    state.store.reclassify(account, &outcome).await?;

    Ok(NotificationReport {
        account: account.to_string(),
        outcome,
        terminated,
    })
}

/// Feed watcher exit reports back into the pool.
///
/// Holds only a weak reference so the task ends once every [`Supervisor`]
/// handle is gone and the watchers have finished.
async fn reap_exits(shared: Weak<Shared>, mut exit_rx: mpsc::UnboundedReceiver<JobExit>) {
    while let Some(exit) = exit_rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };

        let mut state = shared.state.lock().await;
        if state.pool.reap(&exit) {
            if state.store.is_pending(&exit.account) {
                tracing::warn!(
                    account = %exit.account,
                    job_id = exit.id,
                    "Job exited without a notification; account stays pending until the next run",
                );
            }
            shared.live_tx.send_replace(state.pool.size());
        }
    }
}
