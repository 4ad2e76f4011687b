use std::sync::Arc;
use std::time::Instant;

use crate::broker::AdmissionBroker;
use crate::config::Settings;
use crate::connection_manager::ConnectionManager;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub broker: Arc<AdmissionBroker>,
    pub connection_manager: Arc<ConnectionManager>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let broker = AdmissionBroker::new(&settings.broker);
        Self::with_broker(settings, broker)
    }

    /// Build state around an existing broker (e.g. one driven by a manual clock)
    pub fn with_broker(settings: Settings, broker: AdmissionBroker) -> Self {
        let connection_manager =
            Arc::new(ConnectionManager::new(settings.websocket.max_connections));

        Self {
            settings: Arc::new(settings),
            broker: Arc::new(broker),
            connection_manager,
            start_time: Instant::now(),
        }
    }
}
