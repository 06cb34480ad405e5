pub mod cache;
pub mod events;

pub use cache::{CacheNamespace, DEFAULT_TTL, ReadKind};
pub use events::{
    DomainEvent, EventEnvelope, EventHandler, EventType, HandlerError, HandlerRegistry,
};
