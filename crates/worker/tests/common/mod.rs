//! Shared helpers for worker integration tests.
//!
//! Jobs are stand-in Unix processes: `sleep` for a job that runs until it
//! is terminated, `true` for one that exits on its own.

#![allow(dead_code)]

use std::collections::HashSet;
use std::future::Future;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use osverify_core::account::Credential;
use osverify_db::{AccountFiles, AccountStore};
use osverify_worker::launcher::JobLauncher;
use osverify_worker::supervisor::Supervisor;
use tokio::process::{Child, Command};

/// Launcher that runs a fixed stand-in command and records every account
/// it was asked to start. Accounts in `failing` fail to spawn.
pub struct StubLauncher {
    program: &'static str,
    args: Vec<&'static str>,
    failing: HashSet<String>,
    launched: Mutex<Vec<String>>,
}

impl StubLauncher {
    /// Jobs that run until terminated.
    pub fn long_running() -> Self {
        Self::new("sleep", vec!["30"])
    }

    /// Jobs that run briefly and exit on their own.
    pub fn brief() -> Self {
        Self::new("sleep", vec!["0.2"])
    }

    /// Jobs that exit immediately with status 0.
    pub fn exiting() -> Self {
        Self::new("true", vec![])
    }

    fn new(program: &'static str, args: Vec<&'static str>) -> Self {
        Self {
            program,
            args,
            failing: HashSet::new(),
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, accounts: &[&str]) -> Self {
        self.failing = accounts.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

impl JobLauncher for StubLauncher {
    fn spawn(&self, account: &str, _credential: &Credential) -> std::io::Result<Child> {
        if self.failing.contains(account) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "stub launcher refused account",
            ));
        }
        let child = Command::new(self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.launched.lock().unwrap().push(account.to_string());
        Ok(child)
    }
}

pub fn files_in(dir: &tempfile::TempDir) -> AccountFiles {
    AccountFiles::new(
        dir.path().join("complete.csv"),
        dir.path().join("verify.csv"),
        dir.path().join("block.csv"),
    )
}

/// Write a source file with `name, pw-name` rows and open a store on it.
pub async fn store_with(dir: &tempfile::TempDir, accounts: &[&str]) -> AccountStore {
    let files = files_in(dir);
    let contents: String = accounts
        .iter()
        .map(|a| format!("{a}, pw-{a}\n"))
        .collect();
    tokio::fs::write(&files.source, contents).await.unwrap();
    AccountStore::open(files).await.unwrap()
}

pub async fn supervisor_with(
    dir: &tempfile::TempDir,
    accounts: &[&str],
    ceiling: usize,
    launcher: Arc<StubLauncher>,
) -> Supervisor {
    let store = store_with(dir, accounts).await;
    Supervisor::start(store, ceiling, launcher)
}

/// Poll `check` until it returns true, panicking after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn read(path: &std::path::Path) -> String {
    tokio::fs::read_to_string(path).await.unwrap_or_default()
}
