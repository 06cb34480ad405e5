//! In-process transport over tokio broadcast channels.
//!
//! Used when Redis is disabled: every service coordinator in the process
//! shares one `MemoryTransport`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tracing::warn;

use super::transport::{EventTransport, MessageStream, TransportError, TransportMessage};

/// Buffered messages per channel before slow listeners start lagging.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broadcast transport living inside one process.
///
/// Clones share the same channels.
#[derive(Clone)]
pub struct MemoryTransport {
    channels: Arc<DashMap<String, broadcast::Sender<Arc<Vec<u8>>>>>,
    capacity: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Number of live listeners on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Drop every channel, ending all active listener streams.
    pub fn reset(&self) {
        self.channels.clear();
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Arc<Vec<u8>>> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .value()
            .clone()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("channels", &self.channels.len())
            .finish()
    }
}

#[async_trait]
impl EventTransport for MemoryTransport {
    fn mode(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<usize, TransportError> {
        let Some(sender) = self.channels.get(channel).map(|s| s.value().clone()) else {
            return Ok(0);
        };
        // send only fails when there are no receivers
        Ok(sender.send(Arc::new(payload.to_vec())).unwrap_or(0))
    }

    async fn listen(&self, channels: &[String]) -> Result<MessageStream, TransportError> {
        let streams = channels.iter().map(|channel| {
            let receiver = self.sender(channel).subscribe();
            channel_stream(channel.clone(), receiver)
        });

        Ok(stream::select_all(streams).boxed())
    }
}

fn channel_stream(
    channel: String,
    receiver: broadcast::Receiver<Arc<Vec<u8>>>,
) -> MessageStream {
    stream::unfold((channel, receiver), |(channel, mut receiver)| async move {
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    let message = TransportMessage {
                        channel: channel.clone(),
                        payload: payload.as_ref().clone(),
                    };
                    return Some((message, (channel, receiver)));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "listener lagged, messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn channels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_publish_without_listeners() {
        let transport = MemoryTransport::new();
        let delivered = transport.publish("produto:criado", b"{}").await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_listen_multiplexes_channels() {
        let transport = MemoryTransport::new();
        let mut stream = transport
            .listen(&channels(&["produto:criado", "categoria:deletada"]))
            .await
            .unwrap();

        assert_eq!(transport.listener_count("produto:criado"), 1);
        assert_eq!(transport.publish("categoria:deletada", b"a").await.unwrap(), 1);
        assert_eq!(transport.publish("produto:criado", b"b").await.unwrap(), 1);
        assert_eq!(transport.publish("unidade:criada", b"c").await.unwrap(), 0);

        let mut received = vec![
            stream.next().await.unwrap(),
            stream.next().await.unwrap(),
        ];
        received.sort_by(|a, b| a.channel.cmp(&b.channel));
        assert_eq!(received[0].channel, "categoria:deletada");
        assert_eq!(received[0].payload, b"a");
        assert_eq!(received[1].channel, "produto:criado");
        assert_eq!(received[1].payload, b"b");
    }

    #[tokio::test]
    async fn test_every_listener_receives() {
        let transport = MemoryTransport::new();
        let mut first = transport.listen(&channels(&["usuario:deletado"])).await.unwrap();
        let mut second = transport.listen(&channels(&["usuario:deletado"])).await.unwrap();

        assert_eq!(transport.publish("usuario:deletado", b"x").await.unwrap(), 2);
        assert_eq!(first.next().await.unwrap().payload, b"x");
        assert_eq!(second.next().await.unwrap().payload, b"x");
    }

    #[tokio::test]
    async fn test_dropped_listener_not_counted() {
        let transport = MemoryTransport::new();
        let stream = transport.listen(&channels(&["login:falhou"])).await.unwrap();
        drop(stream);

        assert_eq!(transport.publish("login:falhou", b"x").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_ends_streams() {
        let transport = MemoryTransport::new();
        let mut stream = transport.listen(&channels(&["produto:criado"])).await.unwrap();

        transport.reset();

        let next = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap();
        assert!(next.is_none());
    }
}
