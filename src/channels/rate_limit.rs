//! Outbound pacing for chat messages.
//!
//! Telegram answers bursts with HTTP 429 and a flood-control ban. A sweep
//! that finds new grades for many users at once would trip that, so every
//! outbound message takes a slot from two sliding windows: one for the bot
//! as a whole and one for the destination chat.
//!
//! Timestamps use [`tokio::time::Instant`] so paused-clock tests can move
//! the window.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Per-chat windows kept before idle ones are evicted.
const MAX_TRACKED_CHATS: usize = 1024;

/// Rate limiting error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Limit reached; a slot frees up after `retry_after`.
    #[error("rate limit exceeded; retry after {}s", retry_after.as_secs())]
    Exceeded { retry_after: Duration },
}

/// Limits for outbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RateLimits {
    /// Messages per minute across all chats.
    pub max_messages_per_minute: u32,
    /// Messages per minute to any single chat.
    pub max_messages_per_chat_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_messages_per_minute: 1200,
            max_messages_per_chat_per_minute: 20,
        }
    }
}

/// Sliding window of send timestamps.
#[derive(Debug, Clone)]
struct SlidingWindow {
    limit: u32,
    sent: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            sent: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&first) = self.sent.front() {
            if now.duration_since(first) >= WINDOW {
                self.sent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until a slot frees up, `None` if one is free now.
    fn wait_time(&self, now: Instant) -> Option<Duration> {
        if self.sent.len() < self.limit as usize {
            return None;
        }
        let oldest = self.sent.front()?;
        Some(WINDOW.saturating_sub(now.duration_since(*oldest)))
    }

    fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.sent.len() as u32)
    }
}

/// Bot-wide plus per-chat outbound limiter.
#[derive(Debug)]
pub struct OutboundRateLimiter {
    limits: RateLimits,
    global: SlidingWindow,
    per_chat: HashMap<String, SlidingWindow>,
}

impl OutboundRateLimiter {
    #[must_use]
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            global: SlidingWindow::new(limits.max_messages_per_minute),
            per_chat: HashMap::new(),
        }
    }

    /// Take a slot for one message to `chat`.
    ///
    /// Nothing is recorded when either window is full; the error carries
    /// the longer of the two waits.
    pub fn try_send(&mut self, chat: &str) -> Result<(), RateLimitError> {
        let now = Instant::now();
        if self.per_chat.len() > MAX_TRACKED_CHATS {
            self.evict_idle(now);
        }

        self.global.prune(now);
        let per_chat_limit = self.limits.max_messages_per_chat_per_minute;
        let chat_window = self
            .per_chat
            .entry(chat.to_owned())
            .or_insert_with(|| SlidingWindow::new(per_chat_limit));
        chat_window.prune(now);

        let wait = [self.global.wait_time(now), chat_window.wait_time(now)]
            .into_iter()
            .flatten()
            .max();
        if let Some(retry_after) = wait {
            return Err(RateLimitError::Exceeded { retry_after });
        }

        self.global.sent.push_back(now);
        chat_window.sent.push_back(now);
        Ok(())
    }

    /// Messages `chat` can still receive in the current window.
    #[must_use]
    pub fn remaining(&self, chat: &str) -> u32 {
        let chat_remaining = self
            .per_chat
            .get(chat)
            .map_or(self.limits.max_messages_per_chat_per_minute, SlidingWindow::remaining);
        chat_remaining.min(self.global.remaining())
    }

    fn evict_idle(&mut self, now: Instant) {
        self.per_chat.retain(|_, window| {
            window.prune(now);
            !window.sent.is_empty()
        });
    }
}
