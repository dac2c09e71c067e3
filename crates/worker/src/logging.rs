use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "osverify_worker=info,osverify_db=info";

/// Install the global tracing subscriber.
///
/// Always logs to the console. When `log_file` is given, the same events
/// are appended to that file without ANSI colours. If the file cannot be
/// opened the error is returned after console logging is installed, so the
/// caller can still report it.
pub fn init(log_file: Option<&Path>) -> Result<(), std::io::Error> {
    let file = log_file.map(open_append).transpose();
    let (file, file_error) = match file {
        Ok(file) => (file, None),
        Err(e) => (None, Some(e)),
    };

    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    match file_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn open_append(path: &Path) -> Result<File, std::io::Error> {
    OpenOptions::new().create(true).append(true).open(path)
}
