//! File-backed tracing. The terminal is the UI, so nothing is logged to it.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::FatalStartupError;

/// Installs the global subscriber writing to `log_file`, filtered by `filter`.
///
/// Without a log file, logging stays disabled.
pub fn init(filter: &str, log_file: Option<&Path>) -> Result<(), FatalStartupError> {
    let Some(path) = log_file else {
        return Ok(());
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|error| {
            FatalStartupError::Logging(format!("cannot open {}: {error}", path.display()))
        })?;
    let filter = EnvFilter::try_new(filter)
        .map_err(|error| FatalStartupError::Logging(format!("invalid filter {filter:?}: {error}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|error| FatalStartupError::Logging(error.to_string()))
}
