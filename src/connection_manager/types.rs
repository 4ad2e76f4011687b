//! Connection handle and related types

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};

use crate::broker::ConnectionId;
use crate::websocket::ServerMessage;

/// Handle for a single WebSocket connection
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub sender: mpsc::Sender<ServerMessage>,
    pub connected_at: DateTime<Utc>,
    /// Last activity timestamp (Unix seconds) - using AtomicI64 for lock-free updates
    last_activity: AtomicI64,
    close_requested: Notify,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<ServerMessage>) -> Self {
        let now = Utc::now();
        Self {
            id: ConnectionId::new(),
            sender,
            connected_at: now,
            last_activity: AtomicI64::new(now.timestamp()),
            close_requested: Notify::new(),
        }
    }

    pub fn update_activity(&self) {
        self.last_activity
            .store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.last_activity.load(Ordering::Relaxed), 0)
            .unwrap_or_else(Utc::now)
    }

    /// Queue a message, waiting for room in the channel
    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<ServerMessage>> {
        self.sender.send(message).await
    }

    /// Queue a message only if the channel has room right now
    pub fn try_send(&self, message: ServerMessage) -> Result<(), DeliveryError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Backlogged,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Ask the socket task to shut this connection down.
    ///
    /// The socket task runs the disconnect path itself, so teardown still
    /// happens exactly once.
    pub fn request_close(&self) {
        self.close_requested.notify_one();
    }

    /// Resolves once [`request_close`](Self::request_close) has been called
    pub async fn close_requested(&self) {
        self.close_requested.notified().await;
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("connected_at", &self.connected_at)
            .field("last_activity", &self.last_activity())
            .finish_non_exhaustive()
    }
}

/// Why a message was not queued for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("connection is not registered")]
    NotConnected,
    #[error("outbound channel is full")]
    Backlogged,
    #[error("outbound channel is closed")]
    Closed,
}

impl DeliveryError {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryError::NotConnected => "not_connected",
            DeliveryError::Backlogged => "backlogged",
            DeliveryError::Closed => "closed",
        }
    }
}

/// Error returned when connection limits are exceeded
#[derive(Debug, Clone, Error)]
pub enum ConnectionError {
    #[error("Total connection limit exceeded ({current}/{max})")]
    TotalLimitExceeded { current: usize, max: usize },
}
