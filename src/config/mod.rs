mod settings;

pub use settings::{
    BrokerConfig, LogFormat, LoggingConfig, ServerConfig, Settings, WebSocketConfig,
    MAX_CONNECTION_TIMEOUT_SECONDS, MAX_PENDING_TTL_SECONDS,
};
