use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::broker::{BrokerError, CloseReason, ConnectionId, Role};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Become the sender of a new session
    Register {
        #[serde(rename = "vCode")]
        vcode: String,
    },
    /// Become the receiver of a pending session
    Join {
        #[serde(rename = "vCode")]
        vcode: String,
    },
    /// Close the session this connection belongs to
    Release,
    /// Opaque message for the paired peer
    Signal { data: serde_json::Value },
    Ping,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::Join { .. } => "join",
            ClientMessage::Release => "release",
            ClientMessage::Signal { .. } => "signal",
            ClientMessage::Ping => "ping",
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "welcome")]
    Welcome {
        #[serde(rename = "connectionId")]
        connection_id: ConnectionId,
    },
    #[serde(rename = "registered")]
    Registered {
        #[serde(rename = "vCode")]
        vcode: String,
        /// Absent when the configured TTL is too large to express as a date
        #[serde(rename = "expiresAt", skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
    },
    #[serde(rename = "paired")]
    Paired {
        #[serde(rename = "vCode")]
        vcode: String,
        role: Role,
    },
    #[serde(rename = "session_closed")]
    SessionClosed {
        #[serde(rename = "vCode")]
        vcode: String,
        reason: CloseReason,
    },
    #[serde(rename = "signal")]
    Signal { data: serde_json::Value },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "heartbeat")]
    Heartbeat,
    #[serde(rename = "shutdown")]
    Shutdown { reason: String },
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn shutdown(reason: impl Into<String>) -> Self {
        Self::Shutdown {
            reason: reason.into(),
        }
    }
}

impl From<&BrokerError> for ServerMessage {
    fn from(e: &BrokerError) -> Self {
        ServerMessage::error(e.code(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_messages() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "register", "payload": {"vCode": "ABC123"}}))
                .unwrap();
        assert!(matches!(msg, ClientMessage::Register { ref vcode } if vcode == "ABC123"));

        let msg: ClientMessage = serde_json::from_value(json!({"type": "release"})).unwrap();
        assert!(matches!(msg, ClientMessage::Release));

        let msg: ClientMessage = serde_json::from_value(
            json!({"type": "signal", "payload": {"data": {"sdp": "offer"}}}),
        )
        .unwrap();
        assert_eq!(msg.kind(), "signal");

        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "join"})).is_err());
    }

    #[test]
    fn test_server_message_shape() {
        let msg = ServerMessage::Paired {
            vcode: "ABC123".into(),
            role: Role::Receiver,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "paired", "vCode": "ABC123", "role": "receiver"})
        );

        let msg = ServerMessage::SessionClosed {
            vcode: "ABC123".into(),
            reason: CloseReason::SenderDisconnected,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap()["reason"],
            "sender_disconnected"
        );

        assert_eq!(
            serde_json::to_value(ServerMessage::Pong).unwrap(),
            json!({"type": "pong"})
        );
    }
}
