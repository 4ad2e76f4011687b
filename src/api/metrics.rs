//! Prometheus metrics endpoint.

use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::metrics;
use crate::server::AppState;

/// GET /metrics - Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    update_metrics_from_state(&state);

    match metrics::encode_metrics() {
        Ok(output) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode Prometheus metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain")],
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Update Prometheus gauges from AppState
fn update_metrics_from_state(state: &AppState) {
    let conn_stats = state.connection_manager.stats();
    metrics::WS_CONNECTIONS_ACTIVE.set(conn_stats.total_connections as i64);

    let broker_stats = state.broker.stats();
    metrics::SESSIONS_ACTIVE
        .with_label_values(&["pending"])
        .set(broker_stats.pending_sessions as i64);
    metrics::SESSIONS_ACTIVE
        .with_label_values(&["paired"])
        .set(broker_stats.paired_sessions as i64);
}
