use std::path::PathBuf;
use std::time::Duration;

use osverify_core::account::Credential;
use osverify_core::job::JobTemplate;

use crate::dispatch::DispatchConfig;

/// Error type for invalid or missing configuration.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Orchestrator configuration loaded from environment variables.
///
/// Operator credentials have no default and must be provided.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Control listener bind host (default: `127.0.0.1`).
    pub listen_host: String,
    /// Control listener port (default: `3001`).
    pub listen_port: u16,
    /// Concurrency ceiling (default: `5`).
    pub max_jobs: usize,
    /// Pause between admissions (default: 10s).
    pub admission_interval: Duration,
    /// Period of the stats log line (default: 60s).
    pub stats_interval: Duration,
    /// Optional job timeout; unset disables the sweep.
    pub job_timeout: Option<Duration>,
    /// Fixed parameters of the verification job.
    pub template: JobTemplate,
    /// Optional plain-text log file in addition to the console.
    pub log_file: Option<PathBuf>,
}

impl VerifierConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                            | Default             |
    /// |------------------------------------|---------------------|
    /// | `OSVERIFY_LISTEN_HOST`             | `127.0.0.1`         |
    /// | `OSVERIFY_LISTEN_PORT`             | `3001`              |
    /// | `OSVERIFY_MAX_JOBS`                | `5`                 |
    /// | `OSVERIFY_ADMISSION_INTERVAL_SECS` | `10`                |
    /// | `OSVERIFY_STATS_INTERVAL_SECS`     | `60`                |
    /// | `OSVERIFY_JOB_TIMEOUT_SECS`        | unset               |
    /// | `OSVERIFY_LOG_FILE`                | unset               |
    /// | `TRIBOT_USERNAME`                  | required            |
    /// | `TRIBOT_PASSWORD`                  | required            |
    /// | `TRIBOT_WORLD`                     | `308`               |
    /// | `TRIBOT_SCRIPT`                    | `VerifyScript`      |
    /// | `TRIBOT_JAVA`                      | `java`              |
    /// | `TRIBOT_JAR`                       | `tribot-splash.jar` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup. Empty
    /// values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let listen_host = get("OSVERIFY_LISTEN_HOST").unwrap_or_else(|| "127.0.0.1".into());
        let listen_port: u16 = parse_or("OSVERIFY_LISTEN_PORT", get("OSVERIFY_LISTEN_PORT"), 3001)?;

        let max_jobs: usize = parse_or("OSVERIFY_MAX_JOBS", get("OSVERIFY_MAX_JOBS"), 5)?;
        if max_jobs == 0 {
            return Err(ConfigError::Invalid {
                var: "OSVERIFY_MAX_JOBS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let admission_secs: u64 = parse_or(
            "OSVERIFY_ADMISSION_INTERVAL_SECS",
            get("OSVERIFY_ADMISSION_INTERVAL_SECS"),
            10,
        )?;
        let stats_secs: u64 = parse_or(
            "OSVERIFY_STATS_INTERVAL_SECS",
            get("OSVERIFY_STATS_INTERVAL_SECS"),
            60,
        )?;
        if stats_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "OSVERIFY_STATS_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let job_timeout = get("OSVERIFY_JOB_TIMEOUT_SECS")
            .map(|v| parse::<u64>("OSVERIFY_JOB_TIMEOUT_SECS", v))
            .transpose()?
            .map(Duration::from_secs);

        let operator_username = get("TRIBOT_USERNAME")
            .ok_or(ConfigError::Missing("TRIBOT_USERNAME"))?;
        let operator_password = get("TRIBOT_PASSWORD")
            .ok_or(ConfigError::Missing("TRIBOT_PASSWORD"))?;

        let template = JobTemplate {
            program: get("TRIBOT_JAVA").unwrap_or_else(|| "java".into()),
            jar: get("TRIBOT_JAR").unwrap_or_else(|| "tribot-splash.jar".into()),
            operator_username,
            operator_password: Credential::new(operator_password),
            world: get("TRIBOT_WORLD").unwrap_or_else(|| "308".into()),
            script: get("TRIBOT_SCRIPT").unwrap_or_else(|| "VerifyScript".into()),
        };

        Ok(Self {
            listen_host,
            listen_port,
            max_jobs,
            admission_interval: Duration::from_secs(admission_secs),
            stats_interval: Duration::from_secs(stats_secs),
            job_timeout,
            template,
            log_file: get("OSVERIFY_LOG_FILE").map(PathBuf::from),
        })
    }

    /// `host:port` for the control listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }

    pub fn dispatch(&self) -> DispatchConfig {
        DispatchConfig {
            admission_interval: self.admission_interval,
        }
    }
}

fn parse<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value.trim().parse::<T>() {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |v| parse(var, v))
}
