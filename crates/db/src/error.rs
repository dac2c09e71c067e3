use std::path::PathBuf;

use osverify_core::error::CoreError;

/// Error type for account file and store operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to read account file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to append to account file {}: {source}", path.display())]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}
