//! API layer - HTTP endpoint handlers.

mod health;
mod metrics;
mod pairing;
mod routes;

pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use pairing::{
    get_session, receiver_join, release, sender_join, suggest_code, PairingRequest,
    PairingResponse, SuggestResponse,
};
pub use routes::api_routes;
