//! Graceful shutdown handling for the broker.
//!
//! The sequence is:
//! 1. Notify all connected clients about the impending shutdown
//! 2. Signal background tasks to stop
//! 3. Wait for sockets to close, which releases their sessions

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection_manager::ConnectionManager;
use crate::websocket::ServerMessage;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for clients to be notified (default: 5 seconds)
    pub client_notification_timeout: Duration,
    /// Time to wait for connections to close (default: 10 seconds)
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            client_notification_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

pub struct GracefulShutdown {
    connection_manager: Arc<ConnectionManager>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        connection_manager: Arc<ConnectionManager>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self::with_config(connection_manager, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        connection_manager: Arc<ConnectionManager>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            connection_manager,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(
            total_connections = self.connection_manager.stats().total_connections
        )
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Notifying clients");
        result.clients_notified = self.notify_clients(reason).await;

        tracing::info!("Phase 2: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Closing connections");
        result.connections_closed = self.close_connections().await;

        result.duration = start.elapsed();
        result.success = self.connection_manager.stats().total_connections == 0;

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }

    async fn notify_clients(&self, reason: &str) -> usize {
        let connections = self.connection_manager.get_all_connections();
        let total = connections.len();

        if total == 0 {
            return 0;
        }

        let message = ServerMessage::shutdown(reason);
        let mut futures = FuturesUnordered::new();
        let mut notified = 0;

        for conn in connections {
            let msg = message.clone();
            futures.push(async move {
                match timeout(Duration::from_secs(2), conn.send(msg)).await {
                    Ok(Ok(_)) => true,
                    Ok(Err(e)) => {
                        tracing::debug!(
                            connection_id = %conn.id,
                            error = %e,
                            "Failed to send shutdown notification"
                        );
                        false
                    }
                    Err(_) => {
                        tracing::debug!(
                            connection_id = %conn.id,
                            "Timeout sending shutdown notification"
                        );
                        false
                    }
                }
            });
        }

        let notify_future = async {
            while let Some(success) = futures.next().await {
                if success {
                    notified += 1;
                }
            }
        };

        let _ = timeout(self.config.client_notification_timeout, notify_future).await;

        tracing::info!(notified = notified, total = total, "Shutdown notifications sent");

        notified
    }

    /// Ask every socket to close and wait for them to unregister
    async fn close_connections(&self) -> usize {
        let connections = self.connection_manager.get_all_connections();
        let initial = connections.len();
        if initial == 0 {
            return 0;
        }

        for conn in &connections {
            conn.request_close();
        }

        let wait_future = async {
            while self.connection_manager.stats().total_connections > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };

        let _ = timeout(self.config.drain_timeout, wait_future).await;

        let remaining = self.connection_manager.stats().total_connections;
        if remaining > 0 {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close gracefully"
            );
        }

        initial.saturating_sub(remaining)
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether every connection closed in time
    pub success: bool,
    pub clients_notified: usize,
    pub connections_closed: usize,
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let cm = Arc::new(ConnectionManager::default());
        let (tx, _) = broadcast::channel(1);
        let shutdown = GracefulShutdown::new(cm, tx);

        let result = shutdown.execute("test shutdown").await;

        assert!(result.success);
        assert_eq!(result.clients_notified, 0);
        assert_eq!(result.connections_closed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_notifies_and_signals_tasks() {
        let cm = Arc::new(ConnectionManager::default());
        let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(4);
        let handle = cm.register(msg_tx).unwrap();

        // Stand-in for the socket task: unregister once asked to close
        let socket_cm = cm.clone();
        let socket_handle = handle.clone();
        tokio::spawn(async move {
            socket_handle.close_requested().await;
            socket_cm.unregister(socket_handle.id);
        });

        let (tx, mut task_rx) = broadcast::channel(1);
        let shutdown = GracefulShutdown::with_config(
            cm.clone(),
            tx,
            ShutdownConfig {
                client_notification_timeout: Duration::from_secs(1),
                drain_timeout: Duration::from_secs(2),
            },
        );

        let result = shutdown.execute("maintenance").await;

        assert!(result.success);
        assert_eq!(result.clients_notified, 1);
        assert_eq!(result.connections_closed, 1);
        assert!(matches!(
            msg_rx.recv().await,
            Some(ServerMessage::Shutdown { ref reason }) if reason == "maintenance"
        ));
        assert!(task_rx.try_recv().is_ok());
    }

    #[test]
    fn test_shutdown_config_defaults() {
        let config = ShutdownConfig::default();
        assert_eq!(config.client_notification_timeout, Duration::from_secs(5));
        assert_eq!(config.drain_timeout, Duration::from_secs(10));
    }
}
