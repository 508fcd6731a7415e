//! Logging initialization.
//!
//! Logs go to stderr unless `logging.file` is set, in which case they are
//! appended to that file without ANSI colors.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Initializes the global subscriber from `[logging]`.
///
/// `RUST_LOG` wins over `logging.level` when set.
pub fn init(config: &LoggingConfig) {
    match &config.file {
        Some(path) => init_file_logging(path.clone(), &config.level),
        None => init_stderr_logging(&config.level),
    }
}

/// Initializes logging to a file.
pub fn init_file_logging(log_path: PathBuf, level: &str) {
    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging(level);
            return;
        }
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            init_stderr_logging(level);
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Initializes logging to stderr.
pub fn init_stderr_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .init();
}

/// `RUST_LOG` if set, otherwise `level`, otherwise `info`.
fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Default log file location.
///
/// Uses the XDG state directory on Linux (`~/.local/state/querygate/querygate.log`),
/// or falls back to the config directory on other platforms.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("querygate").join("querygate.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("querygate").join("querygate.log");
    }

    std::env::temp_dir().join("querygate.log")
}
