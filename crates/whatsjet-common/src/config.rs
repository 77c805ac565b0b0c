//! Configuration for WhatsJet

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Headroom a claimed send job keeps beyond one provider request
const VISIBILITY_MARGIN_SECS: u64 = 30;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dispatcher configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Send worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Inbound event processor configuration
    #[serde(default)]
    pub inbound: InboundConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Messaging provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost/whatsjet".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Rate-limited dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Sustained sends per second, per vendor
    #[serde(default = "default_rate_per_second")]
    pub rate_per_second: u32,

    /// Token bucket capacity, per vendor
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Recipients fetched per page while dispatching
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_per_second: default_rate_per_second(),
            burst: default_burst(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_rate_per_second() -> u32 {
    20
}

fn default_burst() -> u32 {
    20
}

fn default_batch_size() -> i64 {
    500
}

/// Send worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrent worker slots
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retries after the first attempt before a transient failure is terminal
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Backoff cap in milliseconds
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Upper bound of the random jitter added to each backoff
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,

    /// Queue poll interval when idle
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Seconds a claimed job stays hidden before the queue redelivers it
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    10
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_base_ms() -> u64 {
    1_000
}

fn default_retry_max_ms() -> u64 {
    60_000
}

fn default_retry_jitter_ms() -> u64 {
    250
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_visibility_timeout_secs() -> u64 {
    120
}

/// Inbound event processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundConfig {
    /// Lookups attempted for a status event before it is dropped as orphaned
    #[serde(default = "default_orphan_retry_attempts")]
    pub orphan_retry_attempts: u32,

    /// Delay between orphan lookups in milliseconds
    #[serde(default = "default_orphan_retry_delay_ms")]
    pub orphan_retry_delay_ms: u64,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            orphan_retry_attempts: default_orphan_retry_attempts(),
            orphan_retry_delay_ms: default_orphan_retry_delay_ms(),
        }
    }
}

fn default_orphan_retry_attempts() -> u32 {
    5
}

fn default_orphan_retry_delay_ms() -> u64 {
    500
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks
    #[serde(default = "default_scheduler_poll_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_scheduler_poll_secs(),
        }
    }
}

fn default_scheduler_poll_secs() -> u64 {
    15
}

/// WhatsApp Cloud API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Graph API base URL
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,

    /// Graph API version segment
    #[serde(default = "default_graph_version")]
    pub api_version: String,

    /// Request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// App secret used to check X-Hub-Signature-256 on webhooks
    pub app_secret: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_graph_base_url(),
            api_version: default_graph_version(),
            timeout_secs: default_provider_timeout(),
            app_secret: None,
        }
    }
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_graph_version() -> String {
    "v18.0".to_string()
}

fn default_provider_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from the first config file found, overlaid with
    /// `WHATSJET__SECTION__KEY` environment variables
    pub fn load() -> crate::Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = Self::locate_file() {
            tracing::info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder
            .add_source(config::Environment::with_prefix("WHATSJET").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Job visibility timeout, stretched past the provider request timeout
    /// so an in-flight send is never handed to a second worker
    pub fn job_visibility_timeout(&self) -> Duration {
        let floor = self.provider.timeout_secs + VISIBILITY_MARGIN_SECS;
        Duration::from_secs(self.worker.visibility_timeout_secs.max(floor))
    }

    fn locate_file() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var("WHATSJET_CONFIG") {
            return Some(PathBuf::from(explicit));
        }

        [
            PathBuf::from("./config.toml"),
            PathBuf::from("/etc/whatsjet/config.toml"),
        ]
        .into_iter()
        .find(|p| p.exists())
    }
}
