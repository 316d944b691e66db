//! OBS client configuration with sensible defaults.
//!
//! [`ObsConfig`] controls the endpoint, timeouts, the retry budget and the
//! circuit breaker. The defaults match the behaviour the service has always
//! had against the live OBS: 30s timeout, three attempts, one second apart.

use crate::error::FetchError;
use serde::{Deserialize, Serialize};

/// Default OBS origin.
pub const DEFAULT_BASE_URL: &str = "https://obs.eskisehir.edu.tr";

/// Browser User-Agent the OBS frontend accepts.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Linux x86_64; en-US) Gecko/20100101 Firefox/54.9";

/// Configuration for the OBS grade client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsConfig {
    /// Scheme + host of the OBS (no path, no trailing slash needed).
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Total attempts per fetch, including the first one.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds. Up to a quarter of
    /// this is added as random jitter.
    pub retry_backoff_ms: u64,
    /// User-Agent sent with every request.
    pub user_agent: String,
    /// Consecutive transient failures before the circuit opens.
    pub breaker_failure_threshold: u32,
    /// Seconds the circuit stays open before a probe is allowed.
    pub breaker_cooldown_secs: u64,
}

impl Default for ObsConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_secs: 10,
            max_attempts: 3,
            retry_backoff_ms: 1_000,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            breaker_failure_threshold: 5,
            breaker_cooldown_secs: 120,
        }
    }
}

impl ObsConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `base_url` must be an absolute http(s) URL
    /// - `timeout_secs` must be greater than 0
    /// - `max_attempts` must be greater than 0
    /// - `breaker_failure_threshold` must be greater than 0
    pub fn validate(&self) -> Result<(), FetchError> {
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| FetchError::Config(format!("base_url is not a valid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::Config(
                "base_url must use http or https".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(FetchError::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(FetchError::Config(
                "max_attempts must be greater than 0".into(),
            ));
        }
        if self.breaker_failure_threshold == 0 {
            return Err(FetchError::Config(
                "breaker_failure_threshold must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// The grade endpoint for `term`.
    pub fn grades_url(&self, term: &str) -> Result<url::Url, FetchError> {
        let base = self.base_url.trim_end_matches('/');
        let mut url = url::Url::parse(&format!("{base}/ogrenci/not-gor"))
            .map_err(|e| FetchError::Config(format!("base_url is not a valid URL: {e}")))?;
        url.query_pairs_mut().append_pair("donemId", term);
        Ok(url)
    }

    /// `Referer` header value expected by the OBS.
    pub fn referer(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }
}
