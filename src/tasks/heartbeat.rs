use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connection_manager::{ConnectionManager, DeliveryError};
use crate::metrics::HeartbeatMetrics;
use crate::websocket::ServerMessage;

/// Outcome counts for one heartbeat round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatRound {
    pub sent: usize,
    /// Outbound buffer full; the connection is left to the stale check
    pub skipped: usize,
    /// Socket task already gone
    pub closed: usize,
}

/// Background task for heartbeat and stale connection cleanup
pub struct HeartbeatTask {
    config: WebSocketConfig,
    connection_manager: Arc<ConnectionManager>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: WebSocketConfig,
        connection_manager: Arc<ConnectionManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            connection_manager,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let heartbeat_interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval.max(1));
        let connection_timeout = self.config.connection_timeout;

        let mut heartbeat_timer = tokio::time::interval(heartbeat_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        heartbeat_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            heartbeat_interval_secs = self.config.heartbeat_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = heartbeat_timer.tick() => {
                    self.send_heartbeats();
                }
                _ = cleanup_timer.tick() => {
                    self.cleanup_stale_connections(connection_timeout);
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    /// Queue a heartbeat on every connection without waiting for buffer space
    pub fn send_heartbeats(&self) -> HeartbeatRound {
        let start = Instant::now();
        let mut round = HeartbeatRound::default();

        for handle in self.connection_manager.get_all_connections() {
            match handle.try_send(ServerMessage::Heartbeat) {
                Ok(()) => round.sent += 1,
                Err(DeliveryError::Backlogged) => round.skipped += 1,
                Err(DeliveryError::Closed | DeliveryError::NotConnected) => round.closed += 1,
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        HeartbeatMetrics::record_duration_ms(elapsed_ms);
        if round.skipped > 0 {
            HeartbeatMetrics::record_skipped(round.skipped as u64);
        }

        tracing::debug!(
            sent = round.sent,
            skipped = round.skipped,
            closed = round.closed,
            elapsed_ms = elapsed_ms,
            "Heartbeat round completed"
        );

        let interval_ms = self.config.heartbeat_interval.saturating_mul(1000);
        if elapsed_ms > interval_ms / 2 {
            tracing::warn!(
                elapsed_ms = elapsed_ms,
                heartbeat_interval_ms = interval_ms,
                "Heartbeat round took more than half the interval"
            );
        }

        round
    }

    fn cleanup_stale_connections(&self, timeout_secs: u64) {
        let closed = self
            .connection_manager
            .close_stale_connections(timeout_secs);

        if closed > 0 {
            tracing::info!(
                closed = closed,
                timeout_secs = timeout_secs,
                "Requested close of stale connections"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let config = WebSocketConfig::default();
        let connection_manager = Arc::new(ConnectionManager::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(config, connection_manager, shutdown_rx);
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_heartbeat_sends_to_connections() {
        let config = WebSocketConfig {
            heartbeat_interval: 1,
            connection_timeout: 60,
            cleanup_interval: 60,
            ..Default::default()
        };
        let connection_manager = Arc::new(ConnectionManager::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<ServerMessage>(10);
        let _handle = connection_manager.register(tx).unwrap();

        let task = HeartbeatTask::new(config, connection_manager, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        let msg = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive heartbeat")
            .expect("Channel should not be closed");
        assert!(matches!(msg, ServerMessage::Heartbeat));

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[test]
    fn test_heartbeat_round_counts_outcomes() {
        let connection_manager = Arc::new(ConnectionManager::default());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (live_tx, mut live_rx) = mpsc::channel::<ServerMessage>(4);
        connection_manager.register(live_tx).unwrap();

        let (full_tx, _full_rx) = mpsc::channel::<ServerMessage>(1);
        full_tx.try_send(ServerMessage::Pong).unwrap();
        connection_manager.register(full_tx).unwrap();

        let (gone_tx, gone_rx) = mpsc::channel::<ServerMessage>(4);
        connection_manager.register(gone_tx).unwrap();
        drop(gone_rx);

        let task = HeartbeatTask::new(
            WebSocketConfig::default(),
            connection_manager,
            shutdown_rx,
        );
        let round = task.send_heartbeats();

        assert_eq!(
            round,
            HeartbeatRound {
                sent: 1,
                skipped: 1,
                closed: 1,
            }
        );
        assert!(matches!(live_rx.try_recv(), Ok(ServerMessage::Heartbeat)));
    }

    #[test]
    fn test_huge_heartbeat_interval_does_not_overflow() {
        let config = WebSocketConfig {
            heartbeat_interval: u64::MAX,
            ..Default::default()
        };
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = HeartbeatTask::new(config, Arc::new(ConnectionManager::default()), shutdown_rx);

        assert_eq!(task.send_heartbeats(), HeartbeatRound::default());
    }
}
