//! Channel-oriented pub/sub transport.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// A raw message received on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Multiplexed stream of messages for every listened channel.
///
/// The stream ending means the underlying connection is gone.
pub type MessageStream = BoxStream<'static, TransportMessage>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport connection error: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),
}

/// At-most-once broadcast over named channels.
///
/// Messages published while nobody listens on a channel are lost.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Short label for logs ("memory", "redis").
    fn mode(&self) -> &'static str;

    /// Publish `payload` on `channel`. Returns the number of listeners that
    /// received it (0 is not an error).
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize, TransportError>;

    /// Start listening on `channels`, returning one merged stream.
    async fn listen(&self, channels: &[String]) -> Result<MessageStream, TransportError>;
}
