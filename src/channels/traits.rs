use async_trait::async_trait;
use tokio::sync::mpsc;

/// Inbound message received from a chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInboundMessage {
    /// Adapter id the message arrived on (e.g. `telegram`).
    pub channel: String,
    /// Sending account id.
    pub sender: String,
    /// Where replies go. For Telegram this is the chat id, which is also
    /// the user key.
    pub reply_target: String,
    pub text: String,
}

/// Outbound message sent through a chat channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutboundMessage {
    pub reply_target: String,
    pub text: String,
}

/// Chat channel contract. New messaging backends only need to implement this.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Stable channel identifier (e.g. `telegram`).
    fn id(&self) -> &'static str;

    /// Deliver a message to the channel-specific target.
    async fn send(&self, message: ChannelOutboundMessage) -> anyhow::Result<()>;

    /// Receive inbound messages and forward them until the channel stops
    /// or the receiver is dropped.
    async fn run(&self, inbound_tx: mpsc::Sender<ChannelInboundMessage>) -> anyhow::Result<()>;

    /// Best-effort health probe.
    async fn health_check(&self) -> anyhow::Result<bool>;
}
