use crate::channels::traits::{ChannelAdapter, ChannelInboundMessage, ChannelOutboundMessage};
use crate::config::TelegramConfig;
use crate::error::WatchError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Telegram rejects messages longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Longest flood-control pause honoured before a send is given up.
const MAX_FLOOD_WAIT_SECS: u64 = 30;

/// Telegram channel adapter using the Bot API (`sendMessage` and
/// long-polling `getUpdates`).
pub struct TelegramAdapter {
    api_base: String,
    bot_token: String,
    poll_timeout_secs: u64,
    /// Next `getUpdates` offset. Kept across `run` restarts so a batch
    /// that was already forwarded is not delivered again.
    next_update_id: AtomicI64,
    client: reqwest::Client,
}

impl TelegramAdapter {
    /// Build an adapter. The token is passed separately so an environment
    /// override can take precedence over the config file.
    pub fn new(config: &TelegramConfig, bot_token: String) -> crate::Result<Self> {
        if bot_token.trim().is_empty() {
            return Err(WatchError::Channel("telegram bot token is empty".to_owned()));
        }
        // Long polls hold the request open for `poll_timeout_secs`.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs.saturating_add(15)))
            .build()
            .map_err(|e| WatchError::Channel(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            bot_token,
            poll_timeout_secs: config.poll_timeout_secs,
            next_update_id: AtomicI64::new(0),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// Call a Bot API method and unwrap its `{ok, result}` envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiCallError> {
        // The URL embeds the bot token, so it is stripped from errors.
        let response = self
            .client
            .post(self.method_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiCallError::Other(anyhow::anyhow!("telegram {method}: {}", e.without_url())))?;

        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            ApiCallError::Other(anyhow::anyhow!(
                "telegram {method} returned an unreadable body ({status}): {}",
                e.without_url()
            ))
        })?;

        if !envelope.ok {
            if let Some(retry_after) = envelope.parameters.and_then(|p| p.retry_after) {
                return Err(ApiCallError::Flood { retry_after });
            }
            return Err(ApiCallError::Other(anyhow::anyhow!(
                "telegram {method} failed ({status}): {}",
                envelope.description.unwrap_or_default()
            )));
        }
        envelope
            .result
            .ok_or_else(|| ApiCallError::Other(anyhow::anyhow!("telegram {method} returned no result")))
    }

    async fn send_chunk(&self, chat_id: &str, text: &str) -> anyhow::Result<()> {
        let body = json!({ "chat_id": chat_id, "text": text });
        match self.call::<serde_json::Value>("sendMessage", &body).await {
            Ok(_) => Ok(()),
            Err(ApiCallError::Flood { retry_after }) if retry_after <= MAX_FLOOD_WAIT_SECS => {
                tracing::warn!(retry_after, "telegram flood control, retrying once");
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                self.call::<serde_json::Value>("sendMessage", &body)
                    .await
                    .map(|_| ())
                    .map_err(ApiCallError::into_anyhow)
            }
            Err(err) => Err(err.into_anyhow()),
        }
    }

    /// Fetch the next batch of updates after `offset`.
    async fn get_updates(&self, offset: i64) -> anyhow::Result<Vec<Update>> {
        let body = json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &body)
            .await
            .map_err(ApiCallError::into_anyhow)
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, message: ChannelOutboundMessage) -> anyhow::Result<()> {
        for chunk in split_message(&message.text, MAX_MESSAGE_CHARS) {
            self.send_chunk(&message.reply_target, &chunk).await?;
        }
        Ok(())
    }

    async fn run(&self, inbound_tx: mpsc::Sender<ChannelInboundMessage>) -> anyhow::Result<()> {
        loop {
            let offset = self.next_update_id.load(Ordering::SeqCst);
            let updates = self.get_updates(offset).await?;
            for update in updates {
                self.next_update_id
                    .fetch_max(update.update_id.saturating_add(1), Ordering::SeqCst);
                let Some(inbound) = update.into_inbound() else {
                    continue;
                };
                tracing::debug!(chat = %inbound.reply_target, "telegram message received");
                if inbound_tx.send(inbound).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        let me: BotUser = self
            .call("getMe", &json!({}))
            .await
            .map_err(ApiCallError::into_anyhow)?;
        Ok(me.is_bot)
    }
}

enum ApiCallError {
    Flood { retry_after: u64 },
    Other(anyhow::Error),
}

impl ApiCallError {
    fn into_anyhow(self) -> anyhow::Error {
        match self {
            Self::Flood { retry_after } => {
                anyhow::anyhow!("telegram flood control; retry after {retry_after}s")
            }
            Self::Other(err) => err,
        }
    }
}

/// Split `text` into pieces of at most `max_chars` characters, preferring
/// line boundaries.
#[must_use]
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_owned()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            // A single overlong line is cut at character boundaries.
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
struct BotUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    from: Option<BotUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

impl Update {
    fn into_inbound(self) -> Option<ChannelInboundMessage> {
        let message = self.message?;
        let text = message.text?;
        let chat_id = message.chat.id.to_string();
        Some(ChannelInboundMessage {
            channel: "telegram".to_owned(),
            sender: message
                .from
                .map_or_else(|| chat_id.clone(), |user| user.id.to_string()),
            reply_target: chat_id,
            text,
        })
    }
}
