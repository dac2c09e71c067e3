//! Bounded pool of external verification jobs.
//!
//! [`WorkerPool`] tracks at most one live [`Job`] per account and refuses
//! new launches once the concurrency ceiling is reached. Each launched
//! process is owned by a watcher task that waits for it to exit (or for a
//! terminate request) and then reports a [`JobExit`] on the pool's exit
//! channel. The owner of the pool feeds those reports back into
//! [`WorkerPool::reap`].
//!
//! The pool is not internally synchronised; the
//! [`Supervisor`](crate::supervisor::Supervisor) holds it behind its lock.

use std::collections::HashMap;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use osverify_core::account::Credential;
use osverify_core::types::{JobId, Timestamp};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

use crate::launcher::JobLauncher;

/// How long a terminated job gets to exit after SIGTERM before it is
/// killed outright.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// Public view of a live (or just-removed) job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
    pub account: String,
    pub pid: Option<u32>,
    /// Wall-clock start time, for display only.
    pub started_at: Timestamp,
}

/// Exit report sent by a job's watcher task.
#[derive(Debug)]
pub struct JobExit {
    pub id: JobId,
    pub account: String,
    /// `None` when waiting on the process failed.
    pub status: Option<ExitStatus>,
    /// Whether the exit followed a terminate request.
    pub terminated: bool,
}

/// Errors returned by [`WorkerPool::launch`].
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("pool is at its ceiling of {ceiling} jobs")]
    AtCapacity { ceiling: usize },

    #[error("account {0} already has a live job")]
    AlreadyRunning(String),

    #[error("failed to spawn verification job: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Internal bookkeeping for a live job.
struct Job {
    handle: JobHandle,
    /// Monotonic start time used for the timeout age.
    started: Instant,
    /// Dropping or firing this asks the watcher to terminate the process.
    kill: oneshot::Sender<()>,
}

pub struct WorkerPool {
    ceiling: usize,
    launcher: Arc<dyn JobLauncher>,
    jobs: HashMap<String, Job>,
    next_id: JobId,
    exit_tx: mpsc::UnboundedSender<JobExit>,
    watchers: TaskTracker,
}

impl WorkerPool {
    /// Create an empty pool. Watchers report exits on `exit_tx`.
    pub fn new(
        ceiling: usize,
        launcher: Arc<dyn JobLauncher>,
        exit_tx: mpsc::UnboundedSender<JobExit>,
    ) -> Self {
        Self {
            ceiling,
            launcher,
            jobs: HashMap::new(),
            next_id: 1,
            exit_tx,
            watchers: TaskTracker::new(),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Number of live jobs.
    pub fn size(&self) -> usize {
        self.jobs.len()
    }

    pub fn has_capacity(&self) -> bool {
        self.jobs.len() < self.ceiling
    }

    pub fn contains(&self, account: &str) -> bool {
        self.jobs.contains_key(account)
    }

    pub fn get(&self, account: &str) -> Option<&JobHandle> {
        self.jobs.get(account).map(|job| &job.handle)
    }

    /// Snapshot of all live jobs.
    pub fn handles(&self) -> Vec<JobHandle> {
        self.jobs.values().map(|job| job.handle.clone()).collect()
    }

    /// Spawn a verification job for `account`.
    ///
    /// The ceiling is checked here, at admission time. On spawn failure
    /// nothing is recorded and the caller decides what happens to the
    /// account.
    pub fn launch(
        &mut self,
        account: &str,
        credential: &Credential,
    ) -> Result<JobHandle, LaunchError> {
        if self.jobs.contains_key(account) {
            return Err(LaunchError::AlreadyRunning(account.to_string()));
        }
        if !self.has_capacity() {
            return Err(LaunchError::AtCapacity {
                ceiling: self.ceiling,
            });
        }

        let child = self.launcher.spawn(account, credential)?;

        let id = self.next_id;
        self.next_id += 1;
        let handle = JobHandle {
            id,
            account: account.to_string(),
            pid: child.id(),
            started_at: chrono::Utc::now(),
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        self.watchers.spawn(watch_job(
            child,
            kill_rx,
            handle.clone(),
            self.exit_tx.clone(),
        ));
        self.jobs.insert(
            account.to_string(),
            Job {
                handle: handle.clone(),
                started: Instant::now(),
                kill: kill_tx,
            },
        );

        tracing::info!(
            account = %account,
            job_id = id,
            pid = ?handle.pid,
            live = self.jobs.len(),
            ceiling = self.ceiling,
            "Verification job started",
        );
        Ok(handle)
    }

    /// Terminate the live job for `account`, if any.
    ///
    /// The job leaves the live set immediately; its watcher signals the
    /// process in the background. Calling this for an account without a
    /// live job does nothing and returns `None`.
    pub fn terminate(&mut self, account: &str) -> Option<JobHandle> {
        let job = self.jobs.remove(account)?;
        // The watcher may already be gone if the process exited on its own
        // and the exit report is still queued.
        let _ = job.kill.send(());
        tracing::info!(account = %account, job_id = job.handle.id, "Terminating verification job");
        Some(job.handle)
    }

    /// Terminate every live job. Returns how many were signalled.
    pub fn terminate_all(&mut self) -> usize {
        let accounts: Vec<String> = self.jobs.keys().cloned().collect();
        accounts
            .iter()
            .filter(|account| self.terminate(account).is_some())
            .count()
    }

    /// Remove the job named by an exit report.
    ///
    /// Returns `true` when the job was still live. A report for a job that
    /// was already terminated (or replaced) is ignored.
    pub fn reap(&mut self, exit: &JobExit) -> bool {
        match self.jobs.get(&exit.account) {
            Some(job) if job.handle.id == exit.id => {
                self.jobs.remove(&exit.account);
                true
            }
            _ => false,
        }
    }

    /// Accounts whose job had been running for at least `timeout` at `now`.
    ///
    /// Age is measured on the monotonic clock, so wall-clock jumps neither
    /// expire jobs early nor keep them alive forever.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<String> {
        self.jobs
            .values()
            .filter(|job| now.saturating_duration_since(job.started) >= timeout)
            .map(|job| job.handle.account.clone())
            .collect()
    }

    /// Tracker for the watcher tasks, used to wait for terminated
    /// processes during shutdown.
    pub fn watchers(&self) -> TaskTracker {
        self.watchers.clone()
    }
}

/// Own a child process until it exits, terminating it on request.
async fn watch_job(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    handle: JobHandle,
    exit_tx: mpsc::UnboundedSender<JobExit>,
) {
    let (status, terminated) = tokio::select! {
        status = child.wait() => (status.ok(), false),
        // Fires on an explicit request and when the pool is dropped.
        _ = kill_rx => (terminate_child(&mut child, &handle).await, true),
    };

    match status {
        Some(status) if !terminated => {
            tracing::info!(account = %handle.account, job_id = handle.id, %status, "Verification job exited");
        }
        Some(status) => {
            tracing::debug!(account = %handle.account, job_id = handle.id, %status, "Terminated job exited");
        }
        None => {
            tracing::warn!(account = %handle.account, job_id = handle.id, "Lost track of verification job");
        }
    }

    let _ = exit_tx.send(JobExit {
        id: handle.id,
        account: handle.account,
        status,
        terminated,
    });
}

/// Ask the process to stop with SIGTERM, escalating to SIGKILL after
/// [`TERMINATE_GRACE`].
async fn terminate_child(child: &mut Child, handle: &JobHandle) -> Option<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        match send_sigterm(pid) {
            Ok(()) => {
                if let Ok(status) = tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                    return status.ok();
                }
                tracing::warn!(account = %handle.account, pid, "Job ignored SIGTERM, killing");
            }
            Err(e) => {
                tracing::warn!(account = %handle.account, pid, error = %e, "SIGTERM failed, killing");
            }
        }
    }

    if let Err(e) = child.kill().await {
        tracing::error!(account = %handle.account, error = %e, "Failed to kill verification job");
    }
    child.wait().await.ok()
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // Safety: kill(2) has no memory-safety preconditions. The pid belongs
    // to a child that has not been reaped yet, so it cannot be reused.
    let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
