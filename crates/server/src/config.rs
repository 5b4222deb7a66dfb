use bgrelay::RelayConfig;
use remover::{RemoverBackend, RemoverConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use store::StoreConfig;
use thiserror::Error;

/// Key installed when nothing is configured, for local development only.
pub const DEMO_API_KEY: &str = "demo-key-12345";

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds. Inference is slow, so this is generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Accepted API keys. `BGRELAY__API_KEYS` takes a comma-separated list.
    #[serde(default)]
    pub api_keys: Vec<String>,

    /// Enable permissive CORS
    #[serde(default)]
    pub enable_cors: bool,

    /// Log level / `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Serve `/metrics`
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Removals allowed to run at once. Each one may hold a model in memory.
    #[serde(default = "default_max_concurrent_removals")]
    pub max_concurrent_removals: usize,

    /// Validation, batch and rate limit settings
    #[serde(default)]
    pub relay: RelayConfig,

    /// Where artifacts are kept
    #[serde(default)]
    pub storage: StoreConfig,

    /// Which remover runs
    #[serde(default)]
    pub remover: RemoverConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("relay: {0}")]
    Relay(#[from] bgrelay::ConfigError),
    #[error("remover: {0}")]
    Remover(String),
    #[error("invalid bind address: {0}")]
    InvalidAddress(String),
    #[error("max_body_size_mb must be at least 1")]
    ZeroBodyLimit,
    #[error("timeout_secs must be at least 1")]
    ZeroTimeout,
    #[error("max_concurrent_removals must be at least 1")]
    ZeroConcurrency,
    #[error("no API keys configured")]
    NoApiKeys,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            api_keys: Vec::new(),
            enable_cors: false,
            log_level: default_log_level(),
            metrics_enabled: default_true(),
            max_concurrent_removals: default_max_concurrent_removals(),
            relay: RelayConfig::default(),
            storage: StoreConfig::default(),
            remover: RemoverConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from an optional `server.{toml,yaml,json}` file and
    /// `BGRELAY__*` environment variables (environment wins).
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("server").required(false))
            // Override with environment variables
            .add_source(
                config::Environment::with_prefix("BGRELAY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api_keys")
                    .with_list_parse_key("remover.args")
                    .with_list_parse_key("relay.ingest.allowed_extensions"),
            );

        let mut config: ServerConfig = builder.build()?.try_deserialize()?;
        config.ensure_api_keys();
        config.validate()?;
        Ok(config)
    }

    /// Installs [`DEMO_API_KEY`] when no usable key is configured.
    pub fn ensure_api_keys(&mut self) {
        self.api_keys.retain(|key| !key.trim().is_empty());
        if self.api_keys.is_empty() {
            tracing::warn!(
                "No API keys configured, using demo key '{}'",
                DEMO_API_KEY
            );
            self.api_keys.push(DEMO_API_KEY.to_string());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.max_body_size_mb == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_concurrent_removals == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.api_keys.iter().all(|key| key.trim().is_empty()) {
            return Err(ConfigError::NoApiKeys);
        }
        self.relay.validate()?;
        self.remover
            .validate()
            .map_err(|err| ConfigError::Remover(err.to_string()))?;
        Ok(())
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        addr_str
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(addr_str))
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    /// Settings for tests and local runs: in-memory storage, the identity
    /// remover and a single key.
    pub fn for_testing(api_key: &str) -> Self {
        Self {
            api_keys: vec![api_key.to_string()],
            metrics_enabled: true,
            storage: StoreConfig::in_memory(),
            remover: RemoverConfig {
                backend: RemoverBackend::Identity,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_body_size_mb() -> usize {
    16
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_concurrent_removals() -> usize {
    1
}
