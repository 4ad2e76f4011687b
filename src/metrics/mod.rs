//! Prometheus metrics for the pairing broker.
//!
//! - Session metrics (registered, paired, closed by reason, active by state)
//! - Rejected pairing operations by error code
//! - WebSocket connection and message metrics
//! - Signal relay and heartbeat metrics

mod helpers;

pub use helpers::{
    encode_metrics, HeartbeatMetrics, SessionMetrics, SignalMetrics, WsMessageMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "vcode";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Sessions created by a sender registration
    pub static ref SESSIONS_REGISTERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sessions_registered_total", METRIC_PREFIX),
        "Total sessions registered by senders"
    ).unwrap();

    /// Sessions that admitted a receiver
    pub static ref SESSIONS_PAIRED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sessions_paired_total", METRIC_PREFIX),
        "Total sessions that reached the paired state"
    ).unwrap();

    /// Sessions closed, by reason
    pub static ref SESSIONS_CLOSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_sessions_closed_total", METRIC_PREFIX),
        "Total sessions closed",
        &["reason"]
    ).unwrap();

    /// Active sessions by state (refreshed on scrape)
    pub static ref SESSIONS_ACTIVE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_sessions_active", METRIC_PREFIX),
        "Number of active sessions",
        &["state"]
    ).unwrap();

    /// Time between registration and a receiver joining
    pub static ref PAIRING_WAIT_SECONDS: Histogram = register_histogram!(
        format!("{}_pairing_wait_seconds", METRIC_PREFIX),
        "Seconds a session spent pending before it was paired",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]
    ).unwrap();

    /// Rejected register/join/release calls
    pub static ref OPERATIONS_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_operations_rejected_total", METRIC_PREFIX),
        "Pairing operations rejected, by operation and error code",
        &["operation", "code"]
    ).unwrap();

    // ============================================================================
    // WebSocket Metrics
    // ============================================================================

    /// Currently open WebSocket connections (refreshed on scrape)
    pub static ref WS_CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_ws_connections_active", METRIC_PREFIX),
        "Number of open WebSocket connections"
    ).unwrap();

    /// WebSocket connections opened
    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    /// WebSocket connections closed
    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// WebSocket messages received from clients
    pub static ref WS_MESSAGES_RECEIVED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_received_total", METRIC_PREFIX),
        "Total WebSocket messages received by type",
        &["type"]
    ).unwrap();

    /// Server messages dropped instead of queued, by reason
    pub static ref WS_MESSAGES_DROPPED: IntCounterVec = register_int_counter_vec!(
        format!("{}_ws_messages_dropped_total", METRIC_PREFIX),
        "Server messages that were not queued for a connection",
        &["reason"]
    ).unwrap();

    /// WebSocket connection duration
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    // ============================================================================
    // Signal Relay Metrics
    // ============================================================================

    pub static ref SIGNALS_RELAYED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_signals_relayed_total", METRIC_PREFIX),
        "Total signal messages forwarded to a paired peer"
    ).unwrap();

    pub static ref SIGNALS_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_signals_dropped_total", METRIC_PREFIX),
        "Signal messages that could not be forwarded",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Heartbeat Metrics
    // ============================================================================

    /// Heartbeat round duration
    pub static ref HEARTBEAT_DURATION_MS: Histogram = register_histogram!(
        format!("{}_heartbeat_duration_ms", METRIC_PREFIX),
        "Heartbeat round duration in milliseconds",
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    ).unwrap();

    /// Heartbeats skipped because the outbound buffer was full
    pub static ref HEARTBEAT_SKIPPED: IntCounter = register_int_counter!(
        format!("{}_heartbeat_skipped_total", METRIC_PREFIX),
        "Total heartbeats skipped for backlogged connections"
    ).unwrap();
}
