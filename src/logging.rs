//! Tracing subscriber setup.
//!
//! Logs go to stderr, and additionally to a daily rolling file when
//! `[logging] dir` is set. `RUST_LOG` overrides the configured filter.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;
use crate::error::{Result, WatchError};

/// Prefix of the rolling log file names.
const LOG_FILE_PREFIX: &str = "gradewatch.log";

/// Resolve the active filter: `RUST_LOG` when set and valid, else the
/// configured directives, else `info`.
#[must_use]
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let stderr = fmt::layer().with_writer(std::io::stderr);

    let (file, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|e| WatchError::Config(format!("failed to install log subscriber: {e}")))?;

    if let Some(dir) = &config.dir {
        tracing::info!("writing logs to {}", dir.display());
    }
    Ok(guard)
}
