//! Redis pub/sub transport for multi-process deployments.
//!
//! Publishing goes through the shared connection pool. Listening needs a
//! dedicated connection, since a connection in SUBSCRIBE mode cannot run
//! other commands.
//!
//! ```text
//! ┌──────────────────┐                        ┌──────────────────┐
//! │ produtos-service │                        │ relatorios-svc   │
//! │  EventPublisher ─┼── PUBLISH produto:* ──►│  ActiveSubscr.   │
//! └──────────────────┘         Redis          └──────────────────┘
//! ```

use async_trait::async_trait;
use deadpool_redis::Pool;
use futures_util::StreamExt;
use redis::{AsyncCommands, Client};
use tracing::debug;

use super::transport::{EventTransport, MessageStream, TransportError, TransportMessage};

/// Transport over Redis PUBLISH / SUBSCRIBE.
#[derive(Clone)]
pub struct RedisTransport {
    pool: Pool,
    client: Client,
}

impl RedisTransport {
    /// Create a transport publishing through `pool` and listening on
    /// connections opened from `redis_url`.
    pub fn new(pool: Pool, redis_url: &str) -> Result<Self, TransportError> {
        let client =
            Client::open(redis_url).map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(Self { pool, client })
    }
}

#[async_trait]
impl EventTransport for RedisTransport {
    fn mode(&self) -> &'static str {
        "redis"
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize, TransportError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let receivers: usize = conn
            .publish(channel, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        Ok(receivers)
    }

    async fn listen(&self, channels: &[String]) -> Result<MessageStream, TransportError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        for channel in channels {
            pubsub
                .subscribe(channel.as_str())
                .await
                .map_err(|e| TransportError::Subscribe(format!("{channel}: {e}")))?;
        }

        debug!(channels = ?channels, "Subscribed to Redis channels");

        let stream = pubsub.into_on_message().map(|msg| TransportMessage {
            channel: msg.get_channel_name().to_string(),
            payload: msg.get_payload_bytes().to_vec(),
        });

        Ok(stream.boxed())
    }
}

impl std::fmt::Debug for RedisTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTransport")
            .field("pool_status", &self.pool.status())
            .finish()
    }
}
