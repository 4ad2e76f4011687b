//! Public pairing operations composed from the registry, lifecycle and
//! tracker.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::BrokerConfig;
use crate::metrics::SessionMetrics;

use super::clock::{Clock, SystemClock};
use super::code::VCode;
use super::error::{BrokerError, BrokerResult};
use super::lifecycle::{JoinOutcome, SessionLifecycle};
use super::registry::CodeRegistry;
use super::tracker::ConnectionTracker;
use super::types::{Binding, CloseReason, ClosedSession, ConnectionId, Session};

/// How many random codes to try before handing back a possibly taken one
const SUGGESTION_ATTEMPTS: usize = 16;

/// Out-of-range TTLs saturate instead of wrapping, so they mean "never expires"
fn pending_ttl_from_secs(seconds: u64) -> Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BrokerStats {
    pub pending_sessions: usize,
    pub paired_sessions: usize,
    pub bound_connections: usize,
}

/// Entry point used by the request and connection layers.
///
/// Constructed once per running service and shared through `AppState`.
pub struct AdmissionBroker {
    registry: Arc<CodeRegistry>,
    tracker: Arc<ConnectionTracker>,
    lifecycle: SessionLifecycle,
    max_code_length: usize,
}

impl AdmissionBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &BrokerConfig, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(CodeRegistry::new());
        let tracker = Arc::new(ConnectionTracker::new());
        let lifecycle = SessionLifecycle::new(
            registry.clone(),
            tracker.clone(),
            clock,
            pending_ttl_from_secs(config.pending_ttl_seconds),
        );

        Self {
            registry,
            tracker,
            lifecycle,
            max_code_length: config.max_code_length,
        }
    }

    /// Validate a raw client-supplied code against the configured format
    pub fn parse_code(&self, raw: &str) -> BrokerResult<VCode> {
        VCode::parse(raw, self.max_code_length)
    }

    /// Register `vcode` with `connection_id` as its sender
    pub fn register_sender(
        &self,
        vcode: VCode,
        connection_id: ConnectionId,
    ) -> BrokerResult<Session> {
        let result = self.lifecycle.open(vcode.clone(), connection_id);
        match &result {
            Ok(_) => {
                SessionMetrics::record_registered();
                tracing::info!(
                    vcode = %vcode,
                    connection_id = %connection_id,
                    "Sender registered vCode"
                );
            }
            Err(e) => self.rejected("register", &vcode, connection_id, e),
        }
        result
    }

    /// Admit `connection_id` as the single receiver of a pending code
    pub fn join_receiver(
        &self,
        vcode: &VCode,
        connection_id: ConnectionId,
    ) -> BrokerResult<Session> {
        let result = match self.lifecycle.transition_to_paired(vcode, connection_id) {
            Ok(JoinOutcome::Paired(session)) => {
                SessionMetrics::record_paired(session.created_at, session.paired_at);
                tracing::info!(
                    vcode = %vcode,
                    connection_id = %connection_id,
                    sender_id = %session.sender,
                    "Receiver joined, session paired"
                );
                return Ok(session);
            }
            Ok(JoinOutcome::Expired(session)) => {
                SessionMetrics::record_closed(CloseReason::Expired);
                tracing::info!(
                    vcode = %vcode,
                    connection_id = %session.sender,
                    reason = %CloseReason::Expired,
                    "Session closed"
                );
                Err(BrokerError::NoSuchCode(vcode.clone()))
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            self.rejected("join", vcode, connection_id, e);
        }
        result
    }

    /// Explicitly close a session. Only its sender or receiver may do so.
    pub fn release(
        &self,
        vcode: &VCode,
        connection_id: ConnectionId,
    ) -> BrokerResult<ClosedSession> {
        let reason = CloseReason::Released;
        match self.lifecycle.close(vcode, connection_id, reason) {
            Ok(session) => {
                SessionMetrics::record_closed(reason);
                Ok(ClosedSession { session, reason })
            }
            Err(e) => {
                self.rejected("release", vcode, connection_id, &e);
                Err(e)
            }
        }
    }

    /// Tear down whatever session the connection was part of.
    ///
    /// Called exactly once per connection when its transport closes. Returns
    /// the closed session so the caller can notify the surviving peer.
    pub fn on_disconnect(&self, connection_id: ConnectionId) -> Option<ClosedSession> {
        let binding = self.tracker.resolve(connection_id).ok()?;
        let reason = CloseReason::disconnected(binding.role);

        match self.lifecycle.close(&binding.vcode, connection_id, reason) {
            Ok(session) => {
                SessionMetrics::record_closed(reason);
                Some(ClosedSession { session, reason })
            }
            Err(e) => {
                // The session went away between resolve and lock (peer left,
                // expiry); make sure no binding is left behind.
                self.tracker.unbind_from(connection_id, &binding.vcode);
                tracing::debug!(
                    connection_id = %connection_id,
                    vcode = %binding.vcode,
                    error = %e,
                    "Disconnect found no session to close"
                );
                None
            }
        }
    }

    /// Close pending sessions that outlived the TTL
    pub fn expire_pending(&self) -> Vec<ClosedSession> {
        let reason = CloseReason::Expired;
        self.lifecycle
            .expire_pending()
            .into_iter()
            .map(|session| {
                SessionMetrics::record_closed(reason);
                tracing::info!(
                    vcode = %session.vcode,
                    connection_id = %session.sender,
                    reason = %reason,
                    "Session closed"
                );
                ClosedSession { session, reason }
            })
            .collect()
    }

    /// Which session a connection belongs to, for routing relay traffic
    pub fn resolve(&self, connection_id: ConnectionId) -> BrokerResult<Binding> {
        self.tracker.resolve(connection_id)
    }

    /// The other party of the connection's session, `None` while pending
    pub fn peer_of(&self, connection_id: ConnectionId) -> BrokerResult<Option<ConnectionId>> {
        let binding = self.tracker.resolve(connection_id)?;
        let session = self.registry.lookup(&binding.vcode)?;
        Ok(session.peer_of(connection_id))
    }

    /// Snapshot of a live session. A pending session past its TTL is
    /// reported as gone even before the sweeper removes it, matching what a
    /// join would see.
    pub fn lookup(&self, vcode: &VCode) -> BrokerResult<Session> {
        let session = self.registry.lookup(vcode)?;
        if self.lifecycle.is_expired(&session, self.lifecycle.now()) {
            return Err(BrokerError::NoSuchCode(vcode.clone()));
        }
        Ok(session)
    }

    /// When a pending session stops admitting receivers. `None` if the TTL
    /// reaches past the representable date range.
    pub fn expires_at(&self, session: &Session) -> Option<DateTime<Utc>> {
        session.created_at.checked_add_signed(self.pending_ttl())
    }

    /// A random code that is free right now. Best effort: it may be taken by
    /// the time the client registers it.
    pub fn suggest_code(&self) -> VCode {
        let mut rng = rand::rng();
        let mut candidate = VCode::random(&mut rng);
        for _ in 1..SUGGESTION_ATTEMPTS {
            if !self.registry.contains(&candidate) {
                break;
            }
            candidate = VCode::random(&mut rng);
        }
        candidate
    }

    pub fn pending_ttl(&self) -> Duration {
        self.lifecycle.pending_ttl()
    }

    pub fn stats(&self) -> BrokerStats {
        let registry = self.registry.stats();
        BrokerStats {
            pending_sessions: registry.pending,
            paired_sessions: registry.paired,
            bound_connections: self.tracker.len(),
        }
    }

    fn rejected(
        &self,
        operation: &'static str,
        vcode: &VCode,
        connection_id: ConnectionId,
        error: &BrokerError,
    ) {
        SessionMetrics::record_rejected(operation, error.code());
        tracing::warn!(
            operation = operation,
            vcode = %vcode,
            connection_id = %connection_id,
            code = error.code(),
            "Pairing operation rejected"
        );
    }
}
