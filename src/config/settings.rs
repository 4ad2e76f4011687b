use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Longest pending TTL accepted from configuration (one week)
pub const MAX_PENDING_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Longest idle timeout accepted from configuration (one day)
pub const MAX_CONNECTION_TIMEOUT_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted HTTP request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Pending sessions older than this are closed
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_seconds: u64,
    /// How often the pending sweep runs
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_max_code_length")]
    pub max_code_length: usize,
    /// Largest signal payload relayed between paired peers
    #[serde(default = "default_signal_max_bytes")]
    pub signal_max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Heartbeat interval in seconds (server sends ping)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    /// Connection timeout in seconds (disconnect if no activity)
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    /// Cleanup task interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
    /// Maximum simultaneous WebSocket connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_body_limit() -> usize {
    16 * 1024
}

fn default_pending_ttl() -> u64 {
    300 // 5 minutes
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_max_code_length() -> usize {
    64
}

fn default_signal_max_bytes() -> usize {
    64 * 1024
}

fn default_heartbeat_interval() -> u64 {
    30 // 30 seconds
}

fn default_connection_timeout() -> u64 {
    120 // 2 minutes
}

fn default_cleanup_interval() -> u64 {
    60 // 1 minute
}

fn default_max_connections() -> usize {
    10000
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("broker.pending_ttl_seconds", 300)?
            .set_default("broker.sweep_interval_seconds", 30)?
            .set_default("websocket.heartbeat_interval", 30)?
            .set_default("websocket.connection_timeout", 120)?
            .set_default("websocket.cleanup_interval", 60)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // VCODE_SERVER__PORT, VCODE_BROKER__PENDING_TTL_SECONDS, VCODE_LOGGING__FORMAT, etc.
            .add_source(
                Environment::with_prefix("VCODE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the broker cannot turn into durations
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttl = self.broker.pending_ttl_seconds;
        if ttl == 0 || ttl > MAX_PENDING_TTL_SECONDS {
            return Err(ConfigError::Message(format!(
                "broker.pending_ttl_seconds must be between 1 and {}, got {}",
                MAX_PENDING_TTL_SECONDS, ttl
            )));
        }

        let timeout = self.websocket.connection_timeout;
        if timeout > MAX_CONNECTION_TIMEOUT_SECONDS {
            return Err(ConfigError::Message(format!(
                "websocket.connection_timeout must be at most {}, got {}",
                MAX_CONNECTION_TIMEOUT_SECONDS, timeout
            )));
        }

        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            broker: BrokerConfig::default(),
            websocket: WebSocketConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            pending_ttl_seconds: default_pending_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
            max_code_length: default_max_code_length(),
            signal_max_bytes: default_signal_max_bytes(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            connection_timeout: default_connection_timeout(),
            cleanup_interval: default_cleanup_interval(),
            max_connections: default_max_connections(),
        }
    }
}
