//! External verification job command line.
//!
//! The argument vector is a pure function of the account, its credential,
//! and the fixed operator parameters in [`JobTemplate`].

use crate::account::Credential;

/// Fixed operator parameters shared by every verification job.
#[derive(Debug, Clone)]
pub struct JobTemplate {
    /// Executable used to start the job (normally `java`).
    pub program: String,
    /// Path to the job archive passed after `-jar`.
    pub jar: String,
    pub operator_username: String,
    pub operator_password: Credential,
    /// Target environment selector.
    pub world: String,
    /// Script identifier run inside the job.
    pub script: String,
}

impl JobTemplate {
    /// Build the ordered argument list for one account.
    ///
    /// The account name is passed twice: once as the login and once as the
    /// script argument, which the script echoes back in its notification.
    pub fn args(&self, account: &str, credential: &Credential) -> Vec<String> {
        let args: [&str; 16] = [
            "-jar",
            &self.jar,
            "--username",
            &self.operator_username,
            "--password",
            self.operator_password.expose(),
            "--charusername",
            account,
            "--charpassword",
            credential.expose(),
            "--charworld",
            &self.world,
            "--script",
            &self.script,
            "--scriptargs",
            account,
        ];
        args.iter().map(|s| s.to_string()).collect()
    }
}
