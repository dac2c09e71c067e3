//! Reading and appending the three account files.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use crate::error::DbError;
use crate::records::AccountRecord;

/// Default source file (accounts awaiting verification).
pub const DEFAULT_SOURCE_FILE: &str = "complete.csv";
/// Default verified file.
pub const DEFAULT_VERIFIED_FILE: &str = "verify.csv";
/// Default blocked file.
pub const DEFAULT_BLOCKED_FILE: &str = "block.csv";

/// Locations of the source, verified, and blocked account files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFiles {
    pub source: PathBuf,
    pub verified: PathBuf,
    pub blocked: PathBuf,
}

impl AccountFiles {
    pub fn new(
        source: impl Into<PathBuf>,
        verified: impl Into<PathBuf>,
        blocked: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source: source.into(),
            verified: verified.into(),
            blocked: blocked.into(),
        }
    }
}

impl Default for AccountFiles {
    fn default() -> Self {
        Self::new(
            DEFAULT_SOURCE_FILE,
            DEFAULT_VERIFIED_FILE,
            DEFAULT_BLOCKED_FILE,
        )
    }
}

/// Read every well-formed row from `path`.
///
/// A missing file yields an empty list. Malformed rows are skipped with a
/// warning.
pub async fn read_records(path: &Path) -> Result<Vec<AccountRecord>, DbError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "Account file absent, skipping");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(DbError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let mut records = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match AccountRecord::parse(line) {
            Some(record) => records.push(record),
            None => {
                tracing::warn!(path = %path.display(), line = index + 1, "Skipping malformed account row");
            }
        }
    }
    Ok(records)
}

/// Append one row to `path`, creating the file if needed, and flush it to
/// disk before returning.
pub async fn append_record(path: &Path, record: &AccountRecord) -> Result<(), DbError> {
    let write = async {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(record.to_line().as_bytes()).await?;
        file.sync_data().await
    };

    write.await.map_err(|source| DbError::Append {
        path: path.to_path_buf(),
        source,
    })
}
