//! Domain event contracts shared by every inventory service.
//!
//! # Architecture
//!
//! ```text
//!  categorias-service                      produtos-service
//!  ┌──────────────────┐                    ┌──────────────────────┐
//!  │ write committed  │                    │ HandlerRegistry      │
//!  │ clear own cache  │   "categoria:*"    │  ├─ handler 1        │
//!  │ publish envelope ├───── channel ─────►│  ├─ handler 2        │
//!  └──────────────────┘                    │  └─ ... (in order)   │
//!                                          └──────────────────────┘
//! ```
//!
//! # Module Structure
//!
//! - [`types`]: the closed event catalog, typed payloads and the wire envelope
//! - [`handlers`]: handler trait and error type
//! - [`registry`]: per-type handler lists and the sequential dispatcher

pub mod handlers;
pub mod registry;
pub mod types;

pub use handlers::{EventHandler, FnHandler, HandlerError};
pub use registry::{DispatchReport, HandlerRegistry};
pub use types::{
    DomainEvent, EnvelopeError, EventEnvelope, EventType, LoginFailed, MovementCreated,
    MovementDeleted, MovementKind, NamedEntity, ProductApproved, UnknownEventType, UserApproved,
    UserCreated, UserRef, UserUpdated,
};
