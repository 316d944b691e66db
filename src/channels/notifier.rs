//! The notify side of a reconciliation cycle.
//!
//! [`Notifier`] is what the cycle sees: "deliver this text to that user".
//! [`ChannelNotifier`] implements it on top of a [`ChannelAdapter`], taking
//! a rate-limiter slot before each send.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::rate_limit::{OutboundRateLimiter, RateLimitError, RateLimits};
use super::traits::{ChannelAdapter, ChannelOutboundMessage};
use crate::store::UserKey;

/// Longest a message waits for a rate-limiter slot before giving up.
const DEFAULT_MAX_QUEUE_WAIT: Duration = Duration::from_secs(60);

/// Delivery failure for a single message. Never fatal to a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// Best-effort message delivery to a user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: UserKey, text: &str) -> Result<(), TransportError>;
}

/// [`Notifier`] that sends through a chat channel adapter.
pub struct ChannelNotifier {
    adapter: Arc<dyn ChannelAdapter>,
    limiter: Mutex<OutboundRateLimiter>,
    max_queue_wait: Duration,
}

impl ChannelNotifier {
    pub fn new(adapter: Arc<dyn ChannelAdapter>, limits: RateLimits) -> Self {
        Self {
            adapter,
            limiter: Mutex::new(OutboundRateLimiter::new(limits)),
            max_queue_wait: DEFAULT_MAX_QUEUE_WAIT,
        }
    }

    /// Override how long a message may wait for a rate-limiter slot.
    #[must_use]
    pub fn with_max_queue_wait(mut self, wait: Duration) -> Self {
        self.max_queue_wait = wait;
        self
    }

    async fn acquire_slot(&self, target: &str) -> Result<(), TransportError> {
        let mut waited = Duration::ZERO;
        loop {
            let check = {
                let mut limiter = self
                    .limiter
                    .lock()
                    .map_err(|_| TransportError::Send("rate limiter lock poisoned".to_owned()))?;
                limiter.try_send(target)
            };
            let RateLimitError::Exceeded { retry_after } = match check {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            if waited + retry_after > self.max_queue_wait {
                return Err(TransportError::RateLimited {
                    retry_after_secs: retry_after.as_secs().max(1),
                });
            }
            tracing::debug!(
                chat = %target,
                wait_ms = retry_after.as_millis() as u64,
                "outbound rate limit reached, waiting"
            );
            tokio::time::sleep(retry_after).await;
            waited += retry_after;
        }
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, recipient: UserKey, text: &str) -> Result<(), TransportError> {
        let target = recipient.to_string();
        self.acquire_slot(&target).await?;
        self.adapter
            .send(ChannelOutboundMessage {
                reply_target: target,
                text: text.to_owned(),
            })
            .await
            .map_err(|err| TransportError::Send(err.to_string()))
    }
}
