//! Read-time enrichment from sibling services.
//!
//! Products reference a category, a storage unit and the user that created
//! them. Their read path may embed those records, fetched from each
//! sibling's unauthenticated internal endpoint
//! (`GET <base>/api/<sibling>/internal/<id>`).
//!
//! Enrichment is optional: every failure is logged and the record is
//! returned without the embedded field.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EnrichmentConfig;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sibling {
    Categorias,
    Unidades,
    Usuarios,
}

impl Sibling {
    pub const ALL: [Sibling; 3] = [Sibling::Categorias, Sibling::Unidades, Sibling::Usuarios];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sibling::Categorias => "categorias",
            Sibling::Unidades => "unidades",
            Sibling::Usuarios => "usuarios",
        }
    }
}

impl std::fmt::Display for Sibling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// ============================================================================
// Circuit breaker
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected without touching the network.
    Open,
    /// One trial call is let through to test recovery.
    HalfOpen,
}

/// Consecutive-failure circuit breaker for one sibling.
///
/// - Closed -> Open: `failure_threshold` consecutive failures
/// - Open -> HalfOpen: `open_duration` elapsed
/// - HalfOpen -> Closed: trial call succeeded
/// - HalfOpen -> Open: trial call failed
/// - HalfOpen -> Open, timer kept: trial call abandoned before an outcome
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    failure_threshold: u32,
    open_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            failure_threshold: failure_threshold.max(1),
            open_duration,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call may go out now. Moves Open to HalfOpen once the open
    /// period has elapsed.
    pub fn allow(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self.opened_at.map_or(Duration::MAX, |at| at.elapsed());
                if elapsed >= self.open_duration {
                    self.state = CircuitState::HalfOpen;
                    debug!("Circuit half-open, allowing a trial call");
                    true
                } else {
                    false
                }
            }
            // A trial call is already out
            CircuitState::HalfOpen => false,
        }
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            info!("Circuit closed after successful trial call");
        }
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    pub fn record_failure(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    warn!(failures = self.consecutive_failures, "Circuit opened");
                    self.open();
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit trial call failed, reopening");
                self.open();
            }
            CircuitState::Open => {}
        }
    }

    /// Give back a trial call that ended without an outcome. The open period
    /// has already elapsed, so the next call goes through as a new trial.
    pub fn abandon_trial(&mut self) {
        if self.state == CircuitState::HalfOpen {
            debug!("Circuit trial call abandoned");
            self.state = CircuitState::Open;
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
    }
}

// ============================================================================
// Client
// ============================================================================

enum Attempt {
    Found(Value),
    NotFound,
    Retryable(String),
    Fatal(String),
}

/// Reports the outcome of one call to its breaker. Dropped without an
/// outcome, as when the caller cancels, it gives back a pending trial call.
struct CallGuard<'a> {
    breaker: &'a Mutex<CircuitBreaker>,
    trial: bool,
}

impl CallGuard<'_> {
    fn success(mut self) {
        self.trial = false;
        self.breaker.lock().record_success();
    }

    fn failure(mut self) {
        self.trial = false;
        self.breaker.lock().record_failure();
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.trial {
            self.breaker.lock().abandon_trial();
        }
    }
}

struct Endpoint {
    base_url: String,
    breaker: Mutex<CircuitBreaker>,
}

/// HTTP client for sibling internal endpoints.
pub struct SiblingClient {
    http: reqwest::Client,
    endpoints: HashMap<Sibling, Endpoint>,
    max_retries: u32,
    retry_base: Duration,
}

impl SiblingClient {
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, EnrichmentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let endpoints = Sibling::ALL
            .into_iter()
            .filter_map(|sibling| {
                let base_url = config.siblings.get(sibling.as_str())?;
                Some((
                    sibling,
                    Endpoint {
                        base_url: base_url.trim_end_matches('/').to_string(),
                        breaker: Mutex::new(CircuitBreaker::new(
                            config.failure_threshold,
                            Duration::from_secs(config.open_secs),
                        )),
                    },
                ))
            })
            .collect();

        Ok(Self {
            http,
            endpoints,
            max_retries: config.max_retries,
            retry_base: Duration::from_millis(config.retry_base_ms),
        })
    }

    pub fn circuit_state(&self, sibling: Sibling) -> Option<CircuitState> {
        self.endpoints
            .get(&sibling)
            .map(|endpoint| endpoint.breaker.lock().state())
    }

    /// Fetch one record from a sibling. `None` on any failure or when the
    /// record does not exist.
    pub async fn fetch(&self, sibling: Sibling, id: i64) -> Option<Value> {
        let Some(endpoint) = self.endpoints.get(&sibling) else {
            debug!(sibling = %sibling, "No base URL configured, skipping enrichment");
            return None;
        };

        let trial = {
            let mut breaker = endpoint.breaker.lock();
            if !breaker.allow() {
                debug!(sibling = %sibling, id, "Circuit open, skipping enrichment");
                metrics::record_enrichment_failure(sibling.as_str());
                return None;
            }
            breaker.state() == CircuitState::HalfOpen
        };
        let call = CallGuard {
            breaker: &endpoint.breaker,
            trial,
        };

        let url = format!("{}/api/{}/internal/{}", endpoint.base_url, sibling, id);
        let mut attempt = 0u32;
        loop {
            match self.attempt(&url).await {
                Attempt::Found(value) => {
                    call.success();
                    return Some(value);
                }
                Attempt::NotFound => {
                    // the sibling answered; only the record is missing
                    call.success();
                    warn!(sibling = %sibling, id, "Related record not found");
                    return None;
                }
                Attempt::Retryable(reason) if attempt < self.max_retries => {
                    let backoff = self.retry_base.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    debug!(
                        sibling = %sibling,
                        id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        reason = %reason,
                        "Retrying sibling request"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Attempt::Retryable(reason) | Attempt::Fatal(reason) => {
                    call.failure();
                    metrics::record_enrichment_failure(sibling.as_str());
                    warn!(sibling = %sibling, id, reason = %reason, "Sibling request failed");
                    return None;
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Attempt {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() => return Attempt::Retryable(e.to_string()),
            Err(e) => return Attempt::Fatal(e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Attempt::NotFound;
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Retryable(format!("status {status}"));
        }
        if !status.is_success() {
            return Attempt::Fatal(format!("status {status}"));
        }

        match response.json::<Value>().await {
            Ok(value) => Attempt::Found(value),
            Err(e) => Attempt::Fatal(format!("invalid body: {e}")),
        }
    }

    /// Embed `categoria`, `unidade` and `usuario` into a product record
    /// according to its `categoria_id`, `unidade_id` and `usuario_id`.
    ///
    /// Only `id`, `nome` and `cargo` of the user are embedded.
    pub async fn enrich_product(&self, product: &mut Value) {
        let Some(fields) = product.as_object() else {
            return;
        };
        let category_id = fields.get("categoria_id").and_then(Value::as_i64);
        let unit_id = fields.get("unidade_id").and_then(Value::as_i64);
        let user_id = fields.get("usuario_id").and_then(Value::as_i64);

        let (category, unit, user) = tokio::join!(
            self.fetch_optional(Sibling::Categorias, category_id),
            self.fetch_optional(Sibling::Unidades, unit_id),
            self.fetch_optional(Sibling::Usuarios, user_id),
        );

        let Some(fields) = product.as_object_mut() else {
            return;
        };
        if let Some(category) = category {
            fields.insert("categoria".into(), category);
        }
        if let Some(unit) = unit {
            fields.insert("unidade".into(), unit);
        }
        if let Some(user) = user {
            fields.insert(
                "usuario".into(),
                serde_json::json!({
                    "id": user.get("id"),
                    "nome": user.get("nome"),
                    "cargo": user.get("cargo"),
                }),
            );
        }
    }

    async fn fetch_optional(&self, sibling: Sibling, id: Option<i64>) -> Option<Value> {
        match id {
            Some(id) => self.fetch(sibling, id).await,
            None => None,
        }
    }
}

impl std::fmt::Debug for SiblingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let siblings: Vec<&str> = self.endpoints.keys().map(Sibling::as_str).collect();
        f.debug_struct("SiblingClient")
            .field("siblings", &siblings)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_opens_after_threshold() {
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        assert!(breaker.allow());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_breaker_success_resets_count() {
        let mut breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_breaker_half_open_trial() {
        let mut breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // open period already elapsed: one trial call goes out
        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.allow());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(breaker.allow());
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_breaker_abandoned_trial_is_given_back() {
        let mut breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.record_failure();
        assert!(breaker.allow());
        assert!(!breaker.allow());

        breaker.abandon_trial();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.allow());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_abandon_outside_half_open_is_noop() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.abandon_trial();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        breaker.abandon_trial();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow());
    }

    #[test]
    fn test_dropped_call_gives_back_trial() {
        let breaker = Mutex::new(CircuitBreaker::new(1, Duration::ZERO));
        breaker.lock().record_failure();
        assert!(breaker.lock().allow());

        drop(CallGuard {
            breaker: &breaker,
            trial: true,
        });
        assert_eq!(breaker.lock().state(), CircuitState::Open);
        assert!(breaker.lock().allow());

        CallGuard {
            breaker: &breaker,
            trial: true,
        }
        .success();
        assert_eq!(breaker.lock().state(), CircuitState::Closed);
    }
}
