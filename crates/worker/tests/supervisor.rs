//! Integration tests for [`Supervisor`]: notification handling, exit
//! reaping, and the timeout sweep.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use osverify_core::account::{AccountState, Outcome};
use osverify_core::error::CoreError;
use osverify_core::protocol::ProtocolError;
use osverify_db::DbError;
use osverify_worker::supervisor::{Admission, NotificationError};

use common::{eventually, files_in, read, supervisor_with, StubLauncher};

// ---------------------------------------------------------------------------
// Test: a notification terminates the live job and verifies the account
// ---------------------------------------------------------------------------

#[tokio::test]
async fn enter_terminates_job_and_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(StubLauncher::long_running());
    let supervisor = supervisor_with(&dir, &["alice"], 1, launcher.clone()).await;

    let job = match supervisor.admit("alice").await {
        Admission::Launched(job) => job,
        other => panic!("expected launch, got {other:?}"),
    };

    let report = supervisor.handle_line("alice:ENTER\n").await.unwrap();
    assert_eq!(report.outcome, Outcome::Verified);
    assert_eq!(report.terminated.map(|j| j.id), Some(job.id));

    assert_eq!(supervisor.live_jobs().await, 0);
    assert_eq!(
        supervisor.account_state("alice").await,
        Some(AccountState::Verified)
    );
    assert_eq!(read(&files_in(&dir).verified).await, "alice, pw-alice\n");
}

// ---------------------------------------------------------------------------
// Test: a notification without a live job still reclassifies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn block_without_live_job_still_reclassifies() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor =
        supervisor_with(&dir, &["x"], 1, Arc::new(StubLauncher::long_running())).await;

    let report = supervisor.handle_line("x:BANNED_REASON").await.unwrap();
    assert!(report.terminated.is_none());
    assert_eq!(
        supervisor.account_state("x").await,
        Some(AccountState::Blocked {
            reason: "BANNED_REASON".to_string()
        })
    );
    assert_eq!(read(&files_in(&dir).blocked).await, "x, pw-x, BANNED_REASON\n");
}

// ---------------------------------------------------------------------------
// Test: malformed and inconsistent notifications are rejected cleanly
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_line_is_a_protocol_error() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor =
        supervisor_with(&dir, &["alice"], 1, Arc::new(StubLauncher::long_running())).await;

    assert_matches!(
        supervisor.handle_line("garbage").await,
        Err(NotificationError::Protocol(ProtocolError::MissingAction(_)))
    );
    assert!(supervisor.account_state("alice").await.unwrap().is_pending());
}

#[tokio::test]
async fn unknown_account_is_a_store_error() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor =
        supervisor_with(&dir, &["alice"], 1, Arc::new(StubLauncher::long_running())).await;

    assert_matches!(
        supervisor.handle_line("nobody:ENTER").await,
        Err(NotificationError::Store(DbError::Core(CoreError::AccountNotFound(_))))
    );
}

#[tokio::test]
async fn second_notification_does_not_rewrite_files() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor =
        supervisor_with(&dir, &["alice"], 1, Arc::new(StubLauncher::long_running())).await;

    supervisor.handle_line("alice:ENTER").await.unwrap();
    assert_matches!(
        supervisor.handle_line("alice:BANNED").await,
        Err(NotificationError::Store(DbError::Core(CoreError::NotPending { .. })))
    );

    let files = files_in(&dir);
    assert_eq!(read(&files.verified).await, "alice, pw-alice\n");
    assert_eq!(read(&files.blocked).await, "");
    assert_eq!(
        supervisor.account_state("alice").await,
        Some(AccountState::Verified)
    );
}

// ---------------------------------------------------------------------------
// Test: admission respects pending state and the ceiling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn admit_checks_pending_and_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = Arc::new(StubLauncher::long_running());
    let supervisor = supervisor_with(&dir, &["a", "b", "c"], 1, launcher.clone()).await;

    supervisor.handle_line("c:BANNED").await.unwrap();
    assert_matches!(supervisor.admit("c").await, Admission::NotPending);
    assert_matches!(supervisor.admit("unknown").await, Admission::NotPending);

    assert_matches!(supervisor.admit("a").await, Admission::Launched(_));
    assert_matches!(supervisor.admit("b").await, Admission::AtCapacity);
    assert_eq!(launcher.launched(), vec!["a"]);

    supervisor.terminate("a").await.unwrap();
    assert!(supervisor.terminate("a").await.is_none());
    assert_matches!(supervisor.admit("b").await, Admission::Launched(_));

    supervisor.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test: natural exit frees the slot and leaves the account pending
// ---------------------------------------------------------------------------

#[tokio::test]
async fn natural_exit_leaves_account_pending() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor =
        supervisor_with(&dir, &["alice"], 1, Arc::new(StubLauncher::exiting())).await;

    assert_matches!(supervisor.admit("alice").await, Admission::Launched(_));

    tokio::time::timeout(Duration::from_secs(5), supervisor.wait_until_drained())
        .await
        .expect("pool should drain after the job exits");
    assert!(supervisor.live_job("alice").await.is_none());
    assert_eq!(
        supervisor.account_state("alice").await,
        Some(AccountState::Pending)
    );
    assert_eq!(supervisor.pending_accounts().await, vec!["alice"]);
}

// ---------------------------------------------------------------------------
// Test: the timeout sweep blocks stale jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_jobs_are_blocked_with_timeout_reason() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor =
        supervisor_with(&dir, &["slow"], 1, Arc::new(StubLauncher::long_running())).await;
    assert_matches!(supervisor.admit("slow").await, Admission::Launched(_));

    assert!(supervisor
        .expire_jobs(Duration::from_secs(3600))
        .await
        .is_empty());

    let reports = supervisor.expire_jobs(Duration::ZERO).await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].terminated.is_some());
    assert_eq!(supervisor.live_jobs().await, 0);
    assert_eq!(
        supervisor.account_state("slow").await,
        Some(AccountState::Blocked {
            reason: "TIMEOUT".to_string()
        })
    );
}

// ---------------------------------------------------------------------------
// Test: shutdown terminates everything
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_terminates_all_live_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let supervisor =
        supervisor_with(&dir, &["a", "b"], 2, Arc::new(StubLauncher::long_running())).await;
    supervisor.admit("a").await;
    supervisor.admit("b").await;
    assert_eq!(supervisor.live_jobs().await, 2);

    let terminated = supervisor.shutdown().await;
    assert_eq!(terminated, 2);
    assert_eq!(supervisor.live_jobs().await, 0);

    let counts = supervisor.counts().await;
    assert_eq!(counts.pending, 2);
    eventually("live count published as zero", || {
        let rx = supervisor.subscribe_live();
        async move { *rx.borrow() == 0 }
    })
    .await;
}
