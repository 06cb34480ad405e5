use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::orchestration::Service;

/// Upper bound on `enrichment.max_retries`; backoff doubles per retry.
pub const MAX_ENRICHMENT_RETRIES: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config build error: {0}")]
    Build(String),

    #[error("config deserialize error: {0}")]
    Deserialize(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Service this process runs the cache agent for (e.g. "produtos")
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.service {
            name.parse::<Service>()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        // Redis validation
        if self.redis.enabled {
            if self.redis.url.is_empty() {
                return Err(ConfigError::Invalid(
                    "redis.enabled=true requires redis.url".into(),
                ));
            }
            if self.redis.pool_size == 0 {
                return Err(ConfigError::Invalid("redis.pool_size must be > 0".into()));
            }
        }
        if self.cache.default_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.default_ttl_secs must be > 0".into(),
            ));
        }
        // Events validation
        if self.events.handler_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "events.handler_timeout_ms must be > 0".into(),
            ));
        }
        if self.events.reconnect_initial_ms == 0
            || self.events.reconnect_max_ms < self.events.reconnect_initial_ms
        {
            return Err(ConfigError::Invalid(
                "events.reconnect_initial_ms must be > 0 and <= events.reconnect_max_ms".into(),
            ));
        }
        // Enrichment validation
        if self.enrichment.enabled {
            if self.enrichment.timeout_ms == 0 {
                return Err(ConfigError::Invalid(
                    "enrichment.timeout_ms must be > 0".into(),
                ));
            }
            if self.enrichment.failure_threshold == 0 {
                return Err(ConfigError::Invalid(
                    "enrichment.failure_threshold must be > 0".into(),
                ));
            }
            if self.enrichment.max_retries > MAX_ENRICHMENT_RETRIES {
                return Err(ConfigError::Invalid(format!(
                    "enrichment.max_retries must be <= {MAX_ENRICHMENT_RETRIES}"
                )));
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// Redis connection shared by the cache store and the event transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis. Disabled means single-process mode with in-memory
    /// cache and transport.
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when a read path does not choose one
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
    /// First delay before re-listening after the event stream drops
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

fn default_handler_timeout_ms() -> u64 {
    30_000
}
fn default_reconnect_initial_ms() -> u64 {
    1_000
}
fn default_reconnect_max_ms() -> u64 {
    300_000
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: default_handler_timeout_ms(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

impl EventsConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn reconnect_policy(&self) -> crate::events::ReconnectPolicy {
        crate::events::ReconnectPolicy {
            initial: Duration::from_millis(self.reconnect_initial_ms),
            max: Duration::from_millis(self.reconnect_max_ms),
        }
    }
}

/// Read-time enrichment from sibling services' internal endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Per-request timeout
    #[serde(default = "default_enrichment_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt on retryable failures
    #[serde(default = "default_enrichment_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_enrichment_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Consecutive failures that open a sibling's circuit
    #[serde(default = "default_enrichment_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before a trial call
    #[serde(default = "default_enrichment_open_secs")]
    pub open_secs: u64,
    /// Base URL per sibling ("categorias", "unidades", "usuarios")
    #[serde(default = "default_sibling_urls")]
    pub siblings: BTreeMap<String, String>,
}

fn default_enrichment_timeout_ms() -> u64 {
    3_000
}
fn default_enrichment_max_retries() -> u32 {
    2
}
fn default_enrichment_retry_base_ms() -> u64 {
    100
}
fn default_enrichment_failure_threshold() -> u32 {
    5
}
fn default_enrichment_open_secs() -> u64 {
    30
}
fn default_sibling_urls() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "categorias".to_string(),
            "http://categorias-service:3004".to_string(),
        ),
        (
            "unidades".to_string(),
            "http://unidades-service:3003".to_string(),
        ),
        (
            "usuarios".to_string(),
            "http://usuarios-service:3002".to_string(),
        ),
    ])
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: default_enrichment_timeout_ms(),
            max_retries: default_enrichment_max_retries(),
            retry_base_ms: default_enrichment_retry_base_ms(),
            failure_threshold: default_enrichment_failure_threshold(),
            open_secs: default_enrichment_open_secs(),
            siblings: default_sibling_urls(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::{AppConfig, ConfigError};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Default config file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "estoque.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, ConfigError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., ESTOQUE__REDIS__ENABLED=true
        builder = builder.add_source(
            Environment::with_prefix("ESTOQUE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| ConfigError::Build(e.to_string()))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| ConfigError::Deserialize(e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }
}
