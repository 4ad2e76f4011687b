//! Metrics helper structs for convenient metric recording

use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};

use crate::broker::CloseReason;

use super::{
    HEARTBEAT_DURATION_MS, HEARTBEAT_SKIPPED, OPERATIONS_REJECTED_TOTAL, PAIRING_WAIT_SECONDS,
    SESSIONS_CLOSED_TOTAL, SESSIONS_PAIRED_TOTAL, SESSIONS_REGISTERED_TOTAL,
    SIGNALS_DROPPED_TOTAL, SIGNALS_RELAYED_TOTAL, WS_MESSAGES_DROPPED, WS_MESSAGES_RECEIVED,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording session lifecycle metrics
pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_registered() {
        SESSIONS_REGISTERED_TOTAL.inc();
    }

    /// Record a pairing and how long the session waited for it
    pub fn record_paired(created_at: DateTime<Utc>, paired_at: Option<DateTime<Utc>>) {
        SESSIONS_PAIRED_TOTAL.inc();
        if let Some(paired_at) = paired_at {
            let waited = paired_at.signed_duration_since(created_at);
            PAIRING_WAIT_SECONDS.observe(waited.num_milliseconds().max(0) as f64 / 1000.0);
        }
    }

    pub fn record_closed(reason: CloseReason) {
        SESSIONS_CLOSED_TOTAL
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    pub fn record_rejected(operation: &str, code: &str) {
        OPERATIONS_REJECTED_TOTAL
            .with_label_values(&[operation, code])
            .inc();
    }
}

/// Helper struct for WebSocket message metrics
pub struct WsMessageMetrics;

impl WsMessageMetrics {
    pub fn record_register() {
        WS_MESSAGES_RECEIVED.with_label_values(&["register"]).inc();
    }

    pub fn record_join() {
        WS_MESSAGES_RECEIVED.with_label_values(&["join"]).inc();
    }

    pub fn record_release() {
        WS_MESSAGES_RECEIVED.with_label_values(&["release"]).inc();
    }

    pub fn record_signal() {
        WS_MESSAGES_RECEIVED.with_label_values(&["signal"]).inc();
    }

    pub fn record_ping() {
        WS_MESSAGES_RECEIVED.with_label_values(&["ping"]).inc();
    }

    /// An outbound message was dropped (`backlogged` or `closed`)
    pub fn record_dropped(reason: &str) {
        WS_MESSAGES_DROPPED.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for signal relay metrics
pub struct SignalMetrics;

impl SignalMetrics {
    pub fn record_relayed() {
        SIGNALS_RELAYED_TOTAL.inc();
    }

    pub fn record_dropped(reason: &str) {
        SIGNALS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Helper struct for heartbeat metrics
pub struct HeartbeatMetrics;

impl HeartbeatMetrics {
    /// Record heartbeat round duration
    pub fn record_duration_ms(duration_ms: u64) {
        HEARTBEAT_DURATION_MS.observe(duration_ms as f64);
    }

    pub fn record_skipped(count: u64) {
        HEARTBEAT_SKIPPED.inc_by(count);
    }
}
