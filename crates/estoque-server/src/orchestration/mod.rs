//! Consistency wiring between the inventory services.
//!
//! A mutating operation, once its database transaction has committed:
//!
//! ```text
//! commit → Coordinator::after_commit(event)
//!            ├─ clear own namespace + entity keys (best effort)
//!            └─ publish event                     (failure reported)
//!
//! other services: event → InvalidateNamespace handler → clear derived cache
//! ```
//!
//! Readers of another service's data may see stale derived entries until
//! their handler runs; the origin service itself never serves stale entries
//! after the write returns.

mod coordinator;
pub mod enrichment;
mod rules;
mod service;

pub use coordinator::{AuditLog, Coordinator, InvalidateNamespace};
pub use enrichment::{CircuitBreaker, CircuitState, EnrichmentError, Sibling, SiblingClient};
pub use rules::{Invalidation, ReadAction, read_rules, write_invalidations};
pub use service::{Service, UnknownService};
