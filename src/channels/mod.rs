//! Chat channels (Telegram) and the runtime that connects them to the
//! command layer.
//!
//! Channel-specific adapters are pluggable behind [`ChannelAdapter`]. The
//! runtime owns adapter supervision and command dispatch; outbound text
//! always goes through a rate-limited [`Notifier`].

pub mod notifier;
pub mod rate_limit;
pub mod telegram;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use gradewatch_obs::GradeSource;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::commands::{Command, CommandHandler};
use crate::store::UserKey;

pub use notifier::{ChannelNotifier, Notifier, TransportError};
pub use rate_limit::RateLimits;
pub use telegram::TelegramAdapter;
pub use traits::{ChannelAdapter, ChannelInboundMessage, ChannelOutboundMessage};

/// Inbound messages buffered between the adapter and the dispatcher.
const DEFAULT_INBOUND_QUEUE_SIZE: usize = 64;

const INITIAL_RESTART_BACKOFF: Duration = Duration::from_secs(2);
const MAX_RESTART_BACKOFF: Duration = Duration::from_secs(60);

/// Runs one chat adapter and answers the commands it receives.
pub struct ChannelRuntime<F> {
    adapter: Arc<dyn ChannelAdapter>,
    notifier: Arc<dyn Notifier>,
    handler: CommandHandler<F>,
    queue_size: usize,
}

impl<F: GradeSource + 'static> ChannelRuntime<F> {
    pub fn new(
        adapter: Arc<dyn ChannelAdapter>,
        notifier: Arc<dyn Notifier>,
        handler: CommandHandler<F>,
    ) -> Self {
        Self {
            adapter,
            notifier,
            handler,
            queue_size: DEFAULT_INBOUND_QUEUE_SIZE,
        }
    }

    #[must_use]
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(8);
        self
    }

    /// Receive and answer messages until `cancel` fires.
    ///
    /// The adapter is restarted with exponential backoff whenever its
    /// receive loop ends. `/get` runs on its own task so one slow refresh
    /// does not hold up other chats; quick commands are answered inline.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let (inbound_tx, mut inbound_rx) = mpsc::channel::<ChannelInboundMessage>(self.queue_size);
        let mut workers = JoinSet::new();
        workers.spawn(supervise_adapter(
            Arc::clone(&self.adapter),
            inbound_tx,
            cancel.clone(),
        ));
        tracing::info!(channel = self.adapter.id(), "channel runtime started");

        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = inbound_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            while workers.try_join_next().is_some() {}
            self.dispatch(message, &mut workers).await;
        }

        workers.shutdown().await;
        tracing::info!(channel = self.adapter.id(), "channel runtime stopped");
        Ok(())
    }

    async fn dispatch(&self, message: ChannelInboundMessage, workers: &mut JoinSet<()>) {
        let user: UserKey = match message.reply_target.parse() {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(
                    channel = %message.channel,
                    chat = %message.reply_target,
                    "ignoring message with unusable reply target: {err}"
                );
                return;
            }
        };
        let Some(command) = Command::parse(&message.text) else {
            tracing::debug!(user = %user, "ignoring non-command message");
            return;
        };
        tracing::debug!(user = %user, command = command.name(), "command received");

        if command.is_slow() {
            let handler = self.handler.clone();
            let notifier = Arc::clone(&self.notifier);
            workers.spawn(async move {
                let replies = handler.handle(user, command).await;
                send_replies(notifier.as_ref(), user, replies).await;
            });
        } else {
            let replies = self.handler.handle(user, command).await;
            send_replies(self.notifier.as_ref(), user, replies).await;
        }
    }
}

async fn send_replies(notifier: &dyn Notifier, user: UserKey, replies: Vec<String>) {
    for reply in replies {
        if let Err(err) = notifier.notify(user, &reply).await {
            tracing::warn!(user = %user, error = %err, "failed to send reply");
        }
    }
}

/// Keep the adapter's receive loop alive until cancelled.
async fn supervise_adapter(
    adapter: Arc<dyn ChannelAdapter>,
    inbound_tx: mpsc::Sender<ChannelInboundMessage>,
    cancel: CancellationToken,
) {
    let mut backoff = INITIAL_RESTART_BACKOFF;
    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = adapter.run(inbound_tx.clone()) => result,
        };
        match result {
            Ok(()) => tracing::warn!(channel = adapter.id(), "channel stopped; restarting"),
            Err(err) => tracing::warn!(
                channel = adapter.id(),
                "channel failed: {err}; retrying in {}s",
                backoff.as_secs()
            ),
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(backoff) => {}
        }
        backoff = backoff.saturating_mul(2).min(MAX_RESTART_BACKOFF);
    }
}
