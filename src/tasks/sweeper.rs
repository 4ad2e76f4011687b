//! Closes pending sessions nobody joined within the TTL.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::broker::AdmissionBroker;
use crate::connection_manager::ConnectionManager;
use crate::websocket::notify_closed;

pub struct PendingSweeper {
    interval: Duration,
    broker: Arc<AdmissionBroker>,
    connection_manager: Arc<ConnectionManager>,
    shutdown: broadcast::Receiver<()>,
}

impl PendingSweeper {
    pub fn new(
        interval_secs: u64,
        broker: Arc<AdmissionBroker>,
        connection_manager: Arc<ConnectionManager>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
            broker,
            connection_manager,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);
        timer.tick().await;

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            pending_ttl_secs = self.broker.pending_ttl().num_seconds(),
            "Pending session sweeper started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Pending session sweeper received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.sweep_once();
                }
            }
        }

        tracing::info!("Pending session sweeper stopped");
    }

    /// Expire stale sessions and tell their senders. Returns how many closed.
    pub fn sweep_once(&self) -> usize {
        let expired = self.broker.expire_pending();
        for closed in &expired {
            notify_closed(&self.connection_manager, closed, None);
        }

        if !expired.is_empty() {
            tracing::info!(expired = expired.len(), "Expired pending sessions");
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{CloseReason, ManualClock, VCode};
    use crate::config::BrokerConfig;
    use crate::websocket::ServerMessage;
    use tokio::sync::mpsc;

    fn setup() -> (Arc<AdmissionBroker>, Arc<ManualClock>, Arc<ConnectionManager>) {
        let clock = Arc::new(ManualClock::default());
        let config = BrokerConfig {
            pending_ttl_seconds: 60,
            ..Default::default()
        };
        let broker = Arc::new(AdmissionBroker::with_clock(&config, clock.clone()));
        (broker, clock, Arc::new(ConnectionManager::default()))
    }

    #[tokio::test]
    async fn test_sweep_notifies_sender_of_expiry() {
        let (broker, clock, connections) = setup();
        let (tx, mut rx) = mpsc::channel::<ServerMessage>(10);
        let handle = connections.register(tx).unwrap();

        let vcode = VCode::parse("ABC123", 64).unwrap();
        broker.register_sender(vcode.clone(), handle.id).unwrap();

        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let sweeper = PendingSweeper::new(1, broker.clone(), connections.clone(), shutdown_rx);

        assert_eq!(sweeper.sweep_once(), 0);
        clock.advance(Duration::from_secs(61));
        assert_eq!(sweeper.sweep_once(), 1);

        let msg = rx.recv().await.expect("sender should be notified");
        assert!(matches!(
            msg,
            ServerMessage::SessionClosed { reason: CloseReason::Expired, .. }
        ));
        assert!(broker.lookup(&vcode).is_err());
        assert!(broker.resolve(handle.id).is_err());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let (broker, _clock, connections) = setup();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let sweeper = PendingSweeper::new(1, broker, connections, shutdown_rx);

        let handle = tokio::spawn(sweeper.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Sweeper should stop")
            .expect("Sweeper should not panic");
    }

    #[tokio::test]
    async fn test_sweep_is_not_held_up_by_backlogged_sender() {
        let (broker, clock, connections) = setup();
        let (tx, mut rx) = mpsc::channel::<ServerMessage>(1);
        let handle = connections.register(tx).unwrap();
        connections.send_to(handle.id, ServerMessage::Heartbeat).unwrap();

        let stale = VCode::parse("stale", 64).unwrap();
        broker.register_sender(stale.clone(), handle.id).unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let sweeper = PendingSweeper::new(1, broker.clone(), connections.clone(), shutdown_rx);

        clock.advance(Duration::from_secs(61));
        assert_eq!(sweeper.sweep_once(), 1);
        assert!(broker.lookup(&stale).is_err());

        // Later rounds still run
        let (other_tx, _other_rx) = mpsc::channel::<ServerMessage>(1);
        let other = connections.register(other_tx).unwrap();
        broker
            .register_sender(VCode::parse("later", 64).unwrap(), other.id)
            .unwrap();
        clock.advance(Duration::from_secs(61));
        assert_eq!(sweeper.sweep_once(), 1);

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Heartbeat)));
        assert!(rx.try_recv().is_err());
    }
}
