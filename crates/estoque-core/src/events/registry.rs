//! Handler registry and dispatcher for inbound domain events.
//!
//! The registry maps each event type to an ordered list of handlers and
//! routes received envelopes to them with error and panic isolation.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use super::handlers::EventHandler;
use super::types::{EventEnvelope, EventType};

/// Default timeout for a single handler invocation.
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of dispatching one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that completed successfully.
    pub succeeded: usize,
    /// Handlers that returned an error, panicked or timed out.
    pub failed: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

// ============================================================================
// Handler Registry
// ============================================================================

/// Per-event-type handler lists, owned by a single subscriber.
pub struct HandlerRegistry {
    handlers: HashMap<EventType, Vec<Arc<dyn EventHandler>>>,
    timeout: Duration,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_HANDLER_TIMEOUT)
    }

    /// Create a new registry with custom handler timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            timeout,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Append a handler to the list of `event_type`.
    pub fn register(&mut self, event_type: EventType, handler: Arc<dyn EventHandler>) {
        debug!(event_type = %event_type, handler = %handler.name(), "Registered event handler");
        self.handlers.entry(event_type).or_default().push(handler);
    }

    /// Number of handlers registered for `event_type`.
    pub fn handler_count(&self, event_type: EventType) -> usize {
        self.handlers.get(&event_type).map_or(0, Vec::len)
    }

    /// Event types with at least one handler.
    pub fn registered_types(&self) -> Vec<EventType> {
        EventType::ALL
            .into_iter()
            .filter(|t| self.handler_count(*t) > 0)
            .collect()
    }

    /// Run every handler registered for the envelope's type.
    ///
    /// Handlers run one at a time in registration order. Each is wrapped in
    /// a timeout and a panic guard; failures are logged and counted, and
    /// never stop the remaining handlers. The panic guard needs
    /// `panic = "unwind"`; under `abort` a panicking handler ends the process.
    pub async fn dispatch(&self, envelope: &EventEnvelope) -> DispatchReport {
        let event_type = envelope.event_type();
        let mut report = DispatchReport::default();

        let Some(handlers) = self.handlers.get(&event_type).filter(|h| !h.is_empty()) else {
            warn!(event_type = %event_type, "No handlers registered for event");
            return report;
        };

        for handler in handlers {
            let handler_name = handler.name();

            let result = tokio::time::timeout(self.timeout, async {
                AssertUnwindSafe(handler.handle(envelope)).catch_unwind().await
            })
            .await;

            match result {
                Ok(Ok(Ok(()))) => {
                    report.succeeded += 1;
                    info!(
                        event_type = %event_type,
                        handler = %handler_name,
                        "Event processed"
                    );
                }
                Ok(Ok(Err(e))) => {
                    report.failed += 1;
                    error!(
                        event_type = %event_type,
                        handler = %handler_name,
                        error = %e,
                        "Event handler failed"
                    );
                }
                Ok(Err(panic)) => {
                    report.failed += 1;
                    let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    error!(
                        event_type = %event_type,
                        handler = %handler_name,
                        panic = %panic_msg,
                        "Event handler panicked"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    error!(
                        event_type = %event_type,
                        handler = %handler_name,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Event handler timed out"
                    );
                }
            }
        }

        report
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.registered_types())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::handlers::HandlerError;
    use crate::events::types::{DomainEvent, NamedEntity};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records its name into a shared log when invoked.
    struct RecordingHandler {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn name(&self) -> &str {
            self.name
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
            self.log.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        fn name(&self) -> &str {
            "failing"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
            Err(HandlerError::execution("boom"))
        }
    }

    struct PanicHandler;

    #[async_trait]
    impl EventHandler for PanicHandler {
        fn name(&self) -> &str {
            "panic_handler"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
            panic!("This handler panics!");
        }
    }

    struct SlowHandler;

    #[async_trait]
    impl EventHandler for SlowHandler {
        fn name(&self) -> &str {
            "slow"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn category_created() -> EventEnvelope {
        EventEnvelope::new(
            DomainEvent::CategoriaCriada(NamedEntity::new(1, "Adubos")),
            "categorias-service",
        )
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn EventHandler> {
        Arc::new(RecordingHandler {
            name,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(EventType::CategoriaCriada, recorder("first", &log));
        registry.register(EventType::CategoriaCriada, recorder("second", &log));
        registry.register(EventType::CategoriaCriada, recorder("third", &log));

        let report = registry.dispatch(&category_created()).await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_dispatch_only_matching_type() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(EventType::UnidadeCriada, recorder("units", &log));

        let report = registry.dispatch(&category_created()).await;

        assert_eq!(report, DispatchReport::default());
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_isolation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        registry.register(EventType::CategoriaCriada, Arc::new(FailingHandler));
        registry.register(EventType::CategoriaCriada, Arc::new(PanicHandler));
        registry.register(EventType::CategoriaCriada, recorder("survivor", &log));

        let report = registry.dispatch(&category_created()).await;

        assert_eq!(report.failed, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(*log.lock().unwrap(), vec!["survivor"]);
    }

    #[tokio::test]
    async fn test_handler_timeout() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::with_timeout(Duration::from_millis(20));
        registry.register(EventType::CategoriaCriada, Arc::new(SlowHandler));
        registry.register(EventType::CategoriaCriada, recorder("after_slow", &log));

        let report = registry.dispatch(&category_created()).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.total(), 2);
    }

    #[test]
    fn test_registered_types() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        assert!(registry.registered_types().is_empty());

        registry.register(EventType::ProdutoCriado, recorder("a", &log));
        registry.register(EventType::ProdutoCriado, recorder("b", &log));
        registry.register(EventType::LoginFalhou, recorder("c", &log));

        assert_eq!(registry.handler_count(EventType::ProdutoCriado), 2);
        assert_eq!(
            registry.registered_types(),
            vec![EventType::LoginFalhou, EventType::ProdutoCriado]
        );
    }
}
