//! Session, connection and binding types shared across the broker.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::code::VCode;

/// Stable identifier of one live client link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Role a connection plays once bound to a session.
///
/// A connection without a tracker entry is unbound; there is no explicit
/// `Unbound` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Sender => "sender",
            Role::Receiver => "receiver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Paired,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Paired => "paired",
            SessionState::Closed => "closed",
        }
    }
}

/// Why a session left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    SenderDisconnected,
    ReceiverDisconnected,
    Released,
    Expired,
}

impl CloseReason {
    pub fn disconnected(role: Role) -> Self {
        match role {
            Role::Sender => CloseReason::SenderDisconnected,
            Role::Receiver => CloseReason::ReceiverDisconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::SenderDisconnected => "sender_disconnected",
            CloseReason::ReceiverDisconnected => "receiver_disconnected",
            CloseReason::Released => "released",
            CloseReason::Expired => "expired",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pairing attempt keyed by its vCode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub vcode: VCode,
    pub state: SessionState,
    pub sender: ConnectionId,
    pub receiver: Option<ConnectionId>,
    pub created_at: DateTime<Utc>,
    pub paired_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn pending(vcode: VCode, sender: ConnectionId, now: DateTime<Utc>) -> Self {
        Self {
            vcode,
            state: SessionState::Pending,
            sender,
            receiver: None,
            created_at: now,
            paired_at: None,
        }
    }

    /// Role the connection plays in this session, if any
    pub fn role_of(&self, connection_id: ConnectionId) -> Option<Role> {
        if self.sender == connection_id {
            Some(Role::Sender)
        } else if self.receiver == Some(connection_id) {
            Some(Role::Receiver)
        } else {
            None
        }
    }

    /// The other party; `None` while still pending or for outsiders
    pub fn peer_of(&self, connection_id: ConnectionId) -> Option<ConnectionId> {
        match self.role_of(connection_id)? {
            Role::Sender => self.receiver,
            Role::Receiver => Some(self.sender),
        }
    }

    /// Every connection currently referenced by the session
    pub fn participants(&self) -> impl Iterator<Item = ConnectionId> {
        std::iter::once(self.sender).chain(self.receiver)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            vcode: self.vcode.to_string(),
            state: self.state,
            created_at: self.created_at,
            paired_at: self.paired_at,
        }
    }
}

/// A session that has just left the registry, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSession {
    pub session: Session,
    pub reason: CloseReason,
}

/// Client-facing session snapshot (connection ids are not exposed)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(rename = "vCode")]
    pub vcode: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paired_at: Option<DateTime<Utc>>,
}

/// Association of a connection with the session it owns or joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub vcode: VCode,
    pub role: Role,
    pub bound_at: DateTime<Utc>,
}
