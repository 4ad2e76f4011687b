use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::metrics::prometheus_metrics;
use super::pairing::{get_session, receiver_join, release, sender_join, suggest_code};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
        // Pairing endpoints
        .nest(
            "/api",
            Router::new()
                .route("/sender_join", post(sender_join))
                .route("/receiver_join", post(receiver_join))
                .route("/release", post(release))
                .route("/sessions/{vcode}", get(get_session))
                .route("/codes/suggest", get(suggest_code)),
        )
}
