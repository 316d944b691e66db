//! Production [`GradeSource`] backed by the OBS HTTP endpoint.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::config::ObsConfig;
use crate::decode::parse_grades;
use crate::error::FetchError;
use crate::http;
use crate::source::GradeSource;
use crate::types::GradeTable;
use rand::Rng;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// OBS grade client.
///
/// One instance is shared by every cycle: it owns the connection pool and
/// the upstream circuit breaker.
///
/// # Retry policy
///
/// Each [`fetch`](GradeSource::fetch) makes up to `max_attempts` requests.
/// Only retryable errors (see [`FetchError::is_retryable`]) are retried,
/// `retry_backoff_ms` apart plus jitter. Terminal errors return
/// immediately.
#[derive(Debug)]
pub struct ObsClient {
    config: ObsConfig,
    client: reqwest::Client,
    breaker: Mutex<CircuitBreaker>,
}

impl ObsClient {
    /// Create a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Config`] if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: ObsConfig) -> Result<Self, FetchError> {
        config.validate()?;
        let client = http::build_client(&config)?;
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            cooldown: Duration::from_secs(config.breaker_cooldown_secs),
        });
        Ok(Self {
            config,
            client,
            breaker: Mutex::new(breaker),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ObsConfig {
        &self.config
    }

    /// Current upstream circuit state.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker().state()
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        // The breaker holds plain counters; a panic mid-update cannot leave
        // it in a state worse than "slightly off".
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_once(&self, credential: &str, term: &str) -> Result<GradeTable, FetchError> {
        let url = self.config.grades_url(term)?;
        let headers = http::request_headers(&self.config, credential)?;

        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(&e))?;
        tracing::trace!(bytes = body.len(), "OBS response received");

        parse_grades(&body)
    }

    fn backoff(&self) -> Duration {
        let base = self.config.retry_backoff_ms;
        let jitter = rand::thread_rng().gen_range(0..=base / 4);
        Duration::from_millis(base.saturating_add(jitter))
    }
}

impl GradeSource for ObsClient {
    async fn fetch(&self, credential: &str, term: &str) -> Result<GradeTable, FetchError> {
        if let Err(remaining) = self.breaker().should_attempt() {
            return Err(FetchError::CircuitOpen {
                retry_after_secs: remaining.as_secs().saturating_add(1),
            });
        }

        let mut attempt = 1;
        loop {
            match self.fetch_once(credential, term).await {
                Ok(table) => {
                    self.breaker().record_success();
                    tracing::debug!(
                        attempt,
                        courses = table.len(),
                        grades = table.grade_count(),
                        "fetched grade table"
                    );
                    return Ok(table);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    tracing::debug!(attempt, error = %err, "OBS request failed, retrying");
                    tokio::time::sleep(self.backoff()).await;
                    attempt += 1;
                }
                Err(err) => {
                    {
                        let mut breaker = self.breaker();
                        if err.is_retryable() {
                            breaker.record_failure();
                        } else if matches!(err, FetchError::Status { .. } | FetchError::Decode(_)) {
                            breaker.record_success();
                        }
                    }
                    tracing::debug!(attempt, error = %err, "OBS fetch failed");
                    return Err(err);
                }
            }
        }
    }
}
