//! Process launching seam.
//!
//! [`WorkerPool`](crate::pool::WorkerPool) never builds commands itself; it
//! asks a [`JobLauncher`] for a child process. Production uses
//! [`CommandLauncher`], which runs the configured verification job.

use std::process::Stdio;

use osverify_core::account::Credential;
use osverify_core::job::JobTemplate;
use tokio::process::{Child, Command};

/// Starts one external verification process for an account.
pub trait JobLauncher: Send + Sync {
    fn spawn(&self, account: &str, credential: &Credential) -> std::io::Result<Child>;
}

/// Launches the real verification job described by a [`JobTemplate`].
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    template: JobTemplate,
}

impl CommandLauncher {
    pub fn new(template: JobTemplate) -> Self {
        Self { template }
    }
}

impl JobLauncher for CommandLauncher {
    fn spawn(&self, account: &str, credential: &Credential) -> std::io::Result<Child> {
        Command::new(&self.template.program)
            .args(self.template.args(account, credential))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
    }
}
