//! Pairing endpoints: thin wrappers translating HTTP requests into broker
//! operations.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::broker::{BrokerError, ConnectionId, SessionView, VCode};
use crate::error::{AppError, Result};
use crate::server::AppState;
use crate::websocket::{notify_closed, notify_paired, ServerMessage};

/// Raw body of the three mutating endpoints
#[derive(Debug, Deserialize)]
pub struct PairingRequest {
    #[serde(rename = "vCode")]
    pub vcode: Option<String>,
    #[serde(rename = "connectionId")]
    pub connection_id: Option<String>,
}

/// A request whose fields passed validation
#[derive(Debug)]
struct ValidPairing {
    vcode: VCode,
    connection_id: ConnectionId,
}

impl PairingRequest {
    fn validate(self, state: &AppState) -> Result<ValidPairing> {
        let vcode = self
            .vcode
            .ok_or_else(|| BrokerError::InvalidInput("vCode is required".into()))?;
        let vcode = state.broker.parse_code(&vcode)?;

        let raw_id = self
            .connection_id
            .ok_or_else(|| BrokerError::InvalidInput("connectionId is required".into()))?;
        let connection_id: ConnectionId = raw_id
            .parse()
            .map_err(|_| BrokerError::InvalidInput("connectionId must be a UUID".into()))?;

        if !state.connection_manager.is_connected(connection_id) {
            return Err(AppError::UnknownConnection(raw_id));
        }

        Ok(ValidPairing {
            vcode,
            connection_id,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PairingResponse {
    pub message: String,
    pub session: SessionView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestResponse {
    #[serde(rename = "vCode")]
    pub vcode: String,
}

type PairingBody = std::result::Result<Json<PairingRequest>, JsonRejection>;

fn parse_body(body: PairingBody) -> Result<PairingRequest> {
    body.map(|Json(request)| request)
        .map_err(|rejection| BrokerError::InvalidInput(rejection.body_text()).into())
}

/// The WebSocket may have closed while the request was in flight. Its
/// teardown could have run before our mutation, so release on its behalf.
fn ensure_still_connected(state: &AppState, connection_id: ConnectionId) -> Result<()> {
    if state.connection_manager.is_connected(connection_id) {
        return Ok(());
    }

    if let Some(closed) = state.broker.on_disconnect(connection_id) {
        notify_closed(&state.connection_manager, &closed, Some(connection_id));
    }
    Err(AppError::UnknownConnection(connection_id.to_string()))
}

/// POST /api/sender_join - Register a vCode for the calling connection
pub async fn sender_join(
    State(state): State<AppState>,
    body: PairingBody,
) -> Result<Json<PairingResponse>> {
    let request = parse_body(body)?.validate(&state)?;

    let session = state
        .broker
        .register_sender(request.vcode, request.connection_id)?;
    ensure_still_connected(&state, request.connection_id)?;

    let registered = ServerMessage::Registered {
        vcode: session.vcode.to_string(),
        expires_at: state.broker.expires_at(&session),
    };
    if let Err(e) = state
        .connection_manager
        .send_to(request.connection_id, registered)
    {
        tracing::debug!(
            connection_id = %request.connection_id,
            vcode = %session.vcode,
            error = %e,
            "Could not deliver registered notification"
        );
    }

    Ok(Json(PairingResponse {
        message: "vCode received for sender_join".to_string(),
        session: session.view(),
    }))
}

/// POST /api/receiver_join - Admit the calling connection as receiver
pub async fn receiver_join(
    State(state): State<AppState>,
    body: PairingBody,
) -> Result<Json<PairingResponse>> {
    let request = parse_body(body)?.validate(&state)?;

    let session = state
        .broker
        .join_receiver(&request.vcode, request.connection_id)?;
    ensure_still_connected(&state, request.connection_id)?;

    notify_paired(&state.connection_manager, &session);

    Ok(Json(PairingResponse {
        message: "vCode exists, receiver can join".to_string(),
        session: session.view(),
    }))
}

/// POST /api/release - Close the session on behalf of one of its parties
pub async fn release(
    State(state): State<AppState>,
    body: PairingBody,
) -> Result<Json<PairingResponse>> {
    let request = parse_body(body)?.validate(&state)?;

    let closed = state
        .broker
        .release(&request.vcode, request.connection_id)?;
    notify_closed(&state.connection_manager, &closed, None);

    Ok(Json(PairingResponse {
        message: "session released".to_string(),
        session: closed.session.view(),
    }))
}

/// GET /api/sessions/{vcode} - Current state of a session
pub async fn get_session(
    State(state): State<AppState>,
    Path(vcode): Path<String>,
) -> Result<Json<SessionView>> {
    let vcode = state.broker.parse_code(&vcode)?;
    match state.broker.lookup(&vcode) {
        Ok(session) => Ok(Json(session.view())),
        Err(e @ BrokerError::NoSuchCode(_)) => Err(AppError::NotFound(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/codes/suggest - A random code that is currently free
pub async fn suggest_code(State(state): State<AppState>) -> Json<SuggestResponse> {
    Json(SuggestResponse {
        vcode: state.broker.suggest_code().to_string(),
    })
}
