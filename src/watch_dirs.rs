//! Centralized path resolution for gradewatch data and configuration.
//!
//! Paths come from the [`dirs`] crate so they land in the platform's usual
//! locations. Each can be overridden by an environment variable, which is
//! how containerised deployments point the service at a mounted volume.
//!
//! | Function | Default (Linux) | Override |
//! |----------|-----------------|----------|
//! | [`data_dir`] | `~/.local/share/gradewatch` | `GRADEWATCH_DATA_DIR` |
//! | [`config_dir`] | `~/.config/gradewatch` | `GRADEWATCH_CONFIG_DIR` |

use std::path::PathBuf;

/// Root data directory for gradewatch.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("GRADEWATCH_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("gradewatch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/gradewatch-data"))
}

/// Configuration directory for gradewatch.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("GRADEWATCH_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("gradewatch"))
        .unwrap_or_else(|| PathBuf::from("/tmp/gradewatch-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default SQLite database path (`data_dir()/gradewatch.db`).
#[must_use]
pub fn database_file() -> PathBuf {
    data_dir().join("gradewatch.db")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
