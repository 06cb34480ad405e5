//! Event bus runtime: transports, publisher and subscriber.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐              ┌──────────────────────┐
//! │  categorias-service  │              │   produtos-service   │
//! │                      │              │                      │
//! │  EventPublisher      │              │  ActiveSubscription  │
//! │        │             │              │        ▲             │
//! │        ▼             │              │        │             │
//! │  EventTransport ─────┼─── channel ─►│  EventTransport      │
//! └──────────────────────┘  "categoria: │  HandlerRegistry     │
//!                            atualizada"└──────────────────────┘
//! ```
//!
//! Two transports are provided: `RedisTransport` for services running as
//! separate processes and `MemoryTransport` for a single process.
//! Delivery is at-most-once in both.

mod memory;
mod publisher;
mod redis;
mod subscriber;
mod transport;

pub use memory::MemoryTransport;
pub use publisher::{EventPublisher, PublishError};
pub use self::redis::RedisTransport;
pub use subscriber::{ActiveSubscription, ReconnectPolicy, SubscribeError, SubscriberBuilder};
pub use transport::{EventTransport, MessageStream, TransportError, TransportMessage};
