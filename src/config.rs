//! Configuration types for the grade watcher.

use crate::error::{Result, WatchError};
use gradewatch_obs::ObsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides `[telegram] bot_token`.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Snapshot store location.
    pub store: StoreConfig,
    /// Sweep cadence and worker pool.
    pub scheduler: SchedulerConfig,
    /// OBS grade endpoint client.
    pub obs: ObsConfig,
    /// Telegram bot.
    pub telegram: TelegramConfig,
    /// Admin HTTP surface.
    pub gateway: GatewayConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Snapshot store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. Defaults to `data_dir()/gradewatch.db`.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// The configured path, or the platform default.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(crate::watch_dirs::database_file)
    }
}

/// Fleet scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between timer sweeps.
    pub interval_secs: u64,
    /// Cycles allowed in flight at once, across sweeps and `/get`.
    pub max_concurrency: usize,
    /// A sweep still running after this many seconds has its remaining
    /// cycles cancelled.
    pub sweep_deadline_secs: u64,
    /// Deadline for a single on-demand refresh.
    pub on_demand_deadline_secs: u64,
    /// Finished sweeps kept for the admin gateway.
    pub history_limit: usize,
    /// Run a sweep immediately at startup instead of waiting one interval.
    pub startup_sweep: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            max_concurrency: 4,
            sweep_deadline_secs: 30,
            on_demand_deadline_secs: 30,
            history_limit: 100,
            startup_sweep: true,
        }
    }
}

/// Telegram Bot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from BotFather. [`BOT_TOKEN_ENV`] takes precedence.
    pub bot_token: String,
    /// API root, overridable for self-hosted Bot API servers.
    pub api_base: String,
    /// Long-poll timeout for `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Outbound messages per minute across all chats.
    pub max_messages_per_minute: u32,
    /// Outbound messages per minute to a single chat.
    pub max_messages_per_chat_per_minute: u32,
    /// Inbound messages buffered between the poller and command handling.
    pub inbound_queue_size: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        let limits = crate::channels::rate_limit::RateLimits::default();
        Self {
            bot_token: String::new(),
            api_base: "https://api.telegram.org".to_owned(),
            poll_timeout_secs: 60,
            max_messages_per_minute: limits.max_messages_per_minute,
            max_messages_per_chat_per_minute: limits.max_messages_per_chat_per_minute,
            inbound_queue_size: 64,
        }
    }
}

impl TelegramConfig {
    /// Bot token with the environment override applied.
    #[must_use]
    pub fn resolved_bot_token(&self) -> String {
        self.bot_token_with_override(std::env::var(BOT_TOKEN_ENV).ok())
    }

    fn bot_token_with_override(&self, env_token: Option<String>) -> String {
        env_token
            .filter(|token| !token.trim().is_empty())
            .unwrap_or_else(|| self.bot_token.clone())
            .trim()
            .to_owned()
    }

    /// Outbound pacing limits.
    #[must_use]
    pub fn rate_limits(&self) -> crate::channels::rate_limit::RateLimits {
        crate::channels::rate_limit::RateLimits {
            max_messages_per_minute: self.max_messages_per_minute,
            max_messages_per_chat_per_minute: self.max_messages_per_chat_per_minute,
        }
    }
}

/// Admin gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Required as `Authorization: Bearer <token>` when set.
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_owned(),
            port: 8787,
            bearer_token: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files. Stderr only when unset.
    pub dir: Option<PathBuf>,
    /// `EnvFilter` directives, used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            filter: "gradewatch=info,gradewatch_obs=info".to_owned(),
        }
    }
}

/// How serious a configuration issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

/// A problem found by [`WatchConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub id: String,
    pub severity: ConfigSeverity,
    pub summary: String,
}

impl ConfigIssue {
    fn error(id: &str, summary: impl Into<String>) -> Self {
        Self {
            id: id.to_owned(),
            severity: ConfigSeverity::Error,
            summary: summary.into(),
        }
    }

    fn warning(id: &str, summary: impl Into<String>) -> Self {
        Self {
            id: id.to_owned(),
            severity: ConfigSeverity::Warning,
            summary: summary.into(),
        }
    }
}

impl WatchConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| WatchError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| WatchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `config_dir()/gradewatch/config.toml`.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::watch_dirs::config_file()
    }

    /// Check the configuration without touching the network.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        self.validate_with_token(&self.telegram.resolved_bot_token())
    }

    /// `true` when any issue is an error.
    #[must_use]
    pub fn has_blocking_issues(issues: &[ConfigIssue]) -> bool {
        issues
            .iter()
            .any(|issue| issue.severity == ConfigSeverity::Error)
    }

    fn validate_with_token(&self, bot_token: &str) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let scheduler = &self.scheduler;

        if scheduler.interval_secs == 0 {
            issues.push(ConfigIssue::error(
                "scheduler-zero-interval",
                "scheduler.interval_secs must be greater than zero.",
            ));
        }
        if scheduler.max_concurrency == 0 {
            issues.push(ConfigIssue::error(
                "scheduler-zero-concurrency",
                "scheduler.max_concurrency must be at least 1.",
            ));
        }
        if scheduler.sweep_deadline_secs == 0 || scheduler.on_demand_deadline_secs == 0 {
            issues.push(ConfigIssue::error(
                "scheduler-zero-deadline",
                "Sweep and on-demand deadlines must be greater than zero.",
            ));
        } else if scheduler.interval_secs > 0
            && scheduler.sweep_deadline_secs >= scheduler.interval_secs
        {
            issues.push(ConfigIssue::warning(
                "scheduler-deadline-exceeds-interval",
                "The sweep deadline is not shorter than the interval; ticks will be delayed by slow sweeps.",
            ));
        }

        if scheduler.sweep_deadline_secs > 0
            && self.obs.timeout_secs > 0
            && scheduler.sweep_deadline_secs <= self.obs.timeout_secs
        {
            issues.push(ConfigIssue::warning(
                "scheduler-deadline-within-obs-timeout",
                "scheduler.sweep_deadline_secs does not exceed obs.timeout_secs; a timed-out fetch can never be retried within a sweep.",
            ));
        }

        if let Err(err) = self.obs.validate() {
            issues.push(ConfigIssue::error("obs-invalid", err.to_string()));
        }

        if bot_token.is_empty() {
            issues.push(ConfigIssue::error(
                "telegram-missing-token",
                format!("Set telegram.bot_token or the {BOT_TOKEN_ENV} environment variable."),
            ));
        }
        if self.telegram.max_messages_per_minute == 0
            || self.telegram.max_messages_per_chat_per_minute == 0
        {
            issues.push(ConfigIssue::error(
                "telegram-zero-rate-limit",
                "Telegram rate limits must allow at least one message per minute.",
            ));
        }
        if self.telegram.poll_timeout_secs == 0 {
            issues.push(ConfigIssue::warning(
                "telegram-short-polling",
                "telegram.poll_timeout_secs is 0; the bot will busy-poll getUpdates.",
            ));
        }

        if self.gateway.enabled {
            if self.gateway.port == 0 {
                issues.push(ConfigIssue::error(
                    "gateway-zero-port",
                    "gateway.port must be set when the gateway is enabled.",
                ));
            }
            let bearer_missing = self
                .gateway
                .bearer_token
                .as_ref()
                .is_none_or(|token| token.trim().is_empty());
            if self.gateway.host.trim() == "0.0.0.0" && bearer_missing {
                issues.push(ConfigIssue::warning(
                    "gateway-public-without-auth",
                    "Binding to 0.0.0.0 without a bearer token lets anyone trigger sweeps.",
                ));
            }
        }

        issues
    }
}
