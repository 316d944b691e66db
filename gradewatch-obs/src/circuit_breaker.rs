//! Upstream circuit breaker for the OBS.
//!
//! Every user is fetched from the same host, so when the OBS is down every
//! cycle of a sweep would burn its full retry budget against it. The breaker
//! counts consecutive transient failures; once the threshold is reached it
//! opens and fetches fail fast until the cooldown elapses. Then one probe
//! request is allowed (half-open): success closes the circuit, failure
//! re-opens it. Other callers keep failing fast while the probe is out. A
//! probe that never reports back (its fetch was cancelled) is replaced
//! after another cooldown.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  N failures   ┌────────┐  cooldown   ┌──────────┐
//! │ Closed ├──────────────►│  Open  ├────────────►│ HalfOpen │
//! └───▲────┘               └────────┘             └────┬─────┘
//!     │                         ▲                      │
//!     │  success                │  failure              │
//!     └─────────────────────────┴──────────────────────┘
//! ```
//!
//! Terminal responses such as `401` mean the upstream is answering; they
//! count as successes here.

use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Upstream is healthy; all requests are allowed through.
    Closed,
    /// Too many consecutive failures; requests are blocked until cooldown expires.
    Open,
    /// Cooldown has elapsed; a single probe request tests recovery.
    HalfOpen,
}

/// Configuration for circuit breaker behaviour.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before tripping the circuit to Open.
    pub failure_threshold: u32,
    /// Time to wait in Open state before transitioning to HalfOpen.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(120),
        }
    }
}

/// Health tracking for the upstream.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_started_at: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a new, closed circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_started_at: None,
        }
    }

    /// Record a request that reached the upstream and got an answer.
    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!("OBS circuit closed after successful probe");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.probe_started_at = None;
    }

    /// Record a transient failure.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let should_open = self.state == CircuitState::HalfOpen
            || self.consecutive_failures >= self.config.failure_threshold;
        if should_open {
            if self.state != CircuitState::Open {
                tracing::warn!(
                    failures = self.consecutive_failures,
                    "OBS circuit opened"
                );
            }
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
            self.probe_started_at = None;
        }
    }

    /// Check whether a request should be attempted, moving an expired Open
    /// circuit to HalfOpen.
    ///
    /// Returns `Err(remaining)` while the circuit is open, and while a
    /// half-open probe is still outstanding.
    pub fn should_attempt(&mut self) -> Result<(), Duration> {
        match self.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let remaining = self.cooldown_remaining(self.opened_at);
                if remaining.is_zero() {
                    self.state = CircuitState::HalfOpen;
                    self.probe_started_at = Some(Instant::now());
                    Ok(())
                } else {
                    Err(remaining)
                }
            }
            CircuitState::HalfOpen => {
                let remaining = self.cooldown_remaining(self.probe_started_at);
                if remaining.is_zero() {
                    tracing::debug!("OBS probe went unanswered, allowing another");
                    self.probe_started_at = Some(Instant::now());
                    Ok(())
                } else {
                    Err(remaining)
                }
            }
        }
    }

    fn cooldown_remaining(&self, since: Option<Instant>) -> Duration {
        let elapsed = since.map_or(self.config.cooldown, |at| at.elapsed());
        self.config.cooldown.saturating_sub(elapsed)
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Consecutive transient failures since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
