//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::broker::BrokerStats;
use crate::connection_manager::ConnectionStats;
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: ConnectionHealthResponse,
    pub sessions: SessionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
    pub max: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionHealthResponse {
    pub pending: usize,
    pub paired: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub sessions: BrokerStats,
    pub pending_ttl_seconds: i64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let conn_stats = state.connection_manager.stats();
    let broker_stats = state.broker.stats();

    let status = if conn_stats.total_connections >= conn_stats.max_connections {
        "degraded"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: ConnectionHealthResponse {
            total: conn_stats.total_connections,
            max: conn_stats.max_connections,
        },
        sessions: SessionHealthResponse {
            pending: broker_stats.pending_sessions,
            paired: broker_stats.paired_sessions,
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.connection_manager.stats(),
        sessions: state.broker.stats(),
        pending_ttl_seconds: state.broker.pending_ttl().num_seconds(),
    })
}
