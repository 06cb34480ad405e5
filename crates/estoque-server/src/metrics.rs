//! Metrics instrumentation for the cache and event fabric.
//!
//! Counters are recorded through the `metrics` facade. Installing a
//! recorder/exporter is left to the host process; without one the calls
//! are no-ops.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";

    // Event metrics
    pub const EVENTS_PUBLISHED_TOTAL: &str = "events_published_total";
    pub const EVENTS_PUBLISH_FAILURES_TOTAL: &str = "events_publish_failures_total";
    pub const EVENTS_RECEIVED_TOTAL: &str = "events_received_total";
    pub const EVENTS_MALFORMED_TOTAL: &str = "events_malformed_total";
    pub const EVENT_HANDLER_FAILURES_TOTAL: &str = "event_handler_failures_total";

    // Enrichment metrics
    pub const ENRICHMENT_FAILURES_TOTAL: &str = "enrichment_failures_total";
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record a cache hit.
pub fn record_cache_hit(namespace: &str) {
    counter!(names::CACHE_HITS_TOTAL, "namespace" => namespace.to_string()).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss(namespace: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "namespace" => namespace.to_string()).increment(1);
}

/// Record a cache store failure absorbed by the cache-aside layer.
pub fn record_cache_error(operation: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "operation" => operation).increment(1);
}

/// Record keys removed by an invalidation.
pub fn record_cache_invalidation(namespace: &str, removed: usize) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL, "namespace" => namespace.to_string())
        .increment(removed as u64);
}

// =============================================================================
// Event Metrics
// =============================================================================

pub fn record_event_published(event_type: &'static str) {
    counter!(names::EVENTS_PUBLISHED_TOTAL, "tipo" => event_type).increment(1);
}

pub fn record_event_publish_failure(event_type: &'static str) {
    counter!(names::EVENTS_PUBLISH_FAILURES_TOTAL, "tipo" => event_type).increment(1);
}

pub fn record_event_received(event_type: &'static str) {
    counter!(names::EVENTS_RECEIVED_TOTAL, "tipo" => event_type).increment(1);
}

pub fn record_event_malformed() {
    counter!(names::EVENTS_MALFORMED_TOTAL).increment(1);
}

pub fn record_handler_failures(event_type: &'static str, failed: usize) {
    counter!(names::EVENT_HANDLER_FAILURES_TOTAL, "tipo" => event_type).increment(failed as u64);
}

// =============================================================================
// Enrichment Metrics
// =============================================================================

pub fn record_enrichment_failure(sibling: &str) {
    counter!(names::ENRICHMENT_FAILURES_TOTAL, "sibling" => sibling.to_string()).increment(1);
}
