use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::broker::ConnectionId;
use crate::metrics::WsMessageMetrics;
use crate::websocket::ServerMessage;

use super::types::{ConnectionError, ConnectionHandle, DeliveryError};

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub max_connections: usize,
}

/// Manages all active WebSocket connections
pub struct ConnectionManager {
    /// connection_id -> ConnectionHandle
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_connections,
        }
    }

    /// Register a new connection
    pub fn register(
        &self,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<Arc<ConnectionHandle>, ConnectionError> {
        let current = self.connections.len();
        if current >= self.max_connections {
            return Err(ConnectionError::TotalLimitExceeded {
                current,
                max: self.max_connections,
            });
        }

        let handle = Arc::new(ConnectionHandle::new(sender));
        self.connections.insert(handle.id, handle.clone());

        tracing::debug!(connection_id = %handle.id, "Connection registered");

        Ok(handle)
    }

    /// Unregister a connection
    pub fn unregister(&self, connection_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let removed = self.connections.remove(&connection_id).map(|(_, h)| h);
        if removed.is_some() {
            tracing::debug!(connection_id = %connection_id, "Connection unregistered");
        }
        removed
    }

    /// Get connection by ID
    pub fn get_connection(&self, connection_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Get all connections
    pub fn get_all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Queue a message for one connection without waiting.
    ///
    /// A connection whose channel is full is not waited on: the message is
    /// dropped and counted.
    pub fn send_to(
        &self,
        connection_id: ConnectionId,
        message: ServerMessage,
    ) -> Result<(), DeliveryError> {
        let handle = self
            .get_connection(connection_id)
            .ok_or(DeliveryError::NotConnected)?;

        handle.try_send(message).inspect_err(|e| {
            WsMessageMetrics::record_dropped(e.as_str());
            tracing::debug!(
                connection_id = %connection_id,
                reason = %e,
                "Outbound message dropped"
            );
        })
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            total_connections: self.connections.len(),
            max_connections: self.max_connections,
        }
    }

    /// Find connections that have been inactive for longer than the timeout
    pub fn find_stale_connections(&self, timeout_secs: u64) -> Vec<Arc<ConnectionHandle>> {
        let now = Utc::now();
        let timeout = i64::try_from(timeout_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);

        self.connections
            .iter()
            .filter(|entry| now.signed_duration_since(entry.value().last_activity()) > timeout)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Ask stale connections to close and return how many were asked.
    ///
    /// Their socket tasks unregister them and release their sessions.
    pub fn close_stale_connections(&self, timeout_secs: u64) -> usize {
        let stale = self.find_stale_connections(timeout_secs);
        for handle in &stale {
            tracing::info!(connection_id = %handle.id, "Closing stale connection due to timeout");
            handle.request_close();
        }
        stale.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(10000)
    }
}
