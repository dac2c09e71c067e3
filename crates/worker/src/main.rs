//! `osverify-worker` -- account verification orchestrator.
//!
//! Loads the account files, launches up to `OSVERIFY_MAX_JOBS` external
//! verification jobs at a time, and listens on the control port for
//! `account:action` notifications that retire jobs and classify accounts.
//! Exits once every pending account has been dispatched and all jobs have
//! finished, or on SIGINT/SIGTERM.
//!
//! See [`VerifierConfig::from_env`] for environment variables.
//!
//! # Exit codes
//!
//! | Code | Meaning                          |
//! |------|----------------------------------|
//! | `0`  | run finished or was interrupted  |
//! | `2`  | invalid command line             |
//! | `3`  | invalid configuration            |
//! | `4`  | account files could not be read  |
//! | `5`  | control listener failed to bind  |

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use osverify_worker::cli::Cli;
use osverify_worker::config::VerifierConfig;
use osverify_worker::launcher::CommandLauncher;
use osverify_worker::listener::NotificationListener;
use osverify_worker::supervisor::Supervisor;
use osverify_worker::{bootstrap, dispatch, logging, timeout};

const EXIT_CONFIG: u8 = 3;
const EXIT_ACCOUNT_FILES: u8 = 4;
const EXIT_LISTEN: u8 = 5;

/// How long the listener gets to close its connections on exit.
const LISTENER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Exits with code 2 and a usage message on a bad argument count.
    let cli = Cli::parse();

    let config = VerifierConfig::from_env();

    // --- Tracing ---
    let log_file = config.as_ref().ok().and_then(|c| c.log_file.as_deref());
    if let Err(e) = logging::init(log_file) {
        tracing::warn!(error = %e, "Failed to open log file, logging to console only");
    }

    // --- Configuration ---
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    tracing::info!(
        listen = %config.listen_addr(),
        max_jobs = config.max_jobs,
        admission_interval_secs = config.admission_interval.as_secs(),
        "Starting osverify-worker",
    );

    // --- Accounts ---
    let store = match bootstrap::load_accounts(cli.account_files()).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load account files");
            return ExitCode::from(EXIT_ACCOUNT_FILES);
        }
    };

    // --- Control listener ---
    let listener = match NotificationListener::bind(config.listen_addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.listen_addr(), error = %e, "Failed to bind control listener");
            return ExitCode::from(EXIT_LISTEN);
        }
    };

    let launcher = Arc::new(CommandLauncher::new(config.template.clone()));
    let supervisor = Supervisor::start(store, config.max_jobs, launcher);

    let cancel = CancellationToken::new();
    let listener_handle = tokio::spawn(listener.run(supervisor.clone(), cancel.child_token()));
    let stats_handle = dispatch::spawn_stats_reporter(
        supervisor.clone(),
        config.stats_interval,
        cancel.child_token(),
    );
    let sweep_handle = config.job_timeout.map(|job_timeout| {
        timeout::spawn_timeout_sweep(supervisor.clone(), job_timeout, cancel.child_token())
    });

    // --- Dispatch ---
    let dispatch_config = config.dispatch();
    tokio::select! {
        summary = dispatch::run(&supervisor, &dispatch_config) => {
            tracing::info!(
                launched = summary.launched,
                failed = summary.failed,
                skipped = summary.skipped,
                "Dispatch complete",
            );
        }
        () = shutdown_signal() => {
            let terminated = supervisor.shutdown().await;
            tracing::info!(terminated, "Terminated live jobs on shutdown");
        }
    }

    // --- Shutdown ---
    cancel.cancel();
    let _ = tokio::time::timeout(LISTENER_STOP_TIMEOUT, listener_handle).await;
    let _ = stats_handle.await;
    if let Some(handle) = sweep_handle {
        let _ = handle.await;
    }

    let counts = supervisor.counts().await;
    tracing::info!(
        pending = counts.pending,
        verified = counts.verified,
        blocked = counts.blocked,
        "osverify-worker finished",
    );
    ExitCode::SUCCESS
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
///
/// If a handler cannot be installed that signal is ignored and the other
/// one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
