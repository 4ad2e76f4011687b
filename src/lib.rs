// Pairing core
pub mod broker;

// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Transport
pub mod api;
pub mod connection_manager;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
