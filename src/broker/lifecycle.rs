//! Pending → Paired → Closed state machine.
//!
//! Every transition runs under the registry entry lock of its code, and the
//! tracker bindings it implies are updated inside that same critical section.
//! A join and a disconnect on the same code therefore never interleave.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::clock::Clock;
use super::code::VCode;
use super::error::{BrokerError, BrokerResult};
use super::registry::{CodeRegistry, Retention};
use super::tracker::ConnectionTracker;
use super::types::{CloseReason, ConnectionId, Role, Session, SessionState};

/// Result of a join attempt that found its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The caller is now the receiver
    Paired(Session),
    /// The session had outlived the pending TTL and was closed instead
    Expired(Session),
}

pub struct SessionLifecycle {
    registry: Arc<CodeRegistry>,
    tracker: Arc<ConnectionTracker>,
    clock: Arc<dyn Clock>,
    pending_ttl: Duration,
}

impl SessionLifecycle {
    pub fn new(
        registry: Arc<CodeRegistry>,
        tracker: Arc<ConnectionTracker>,
        clock: Arc<dyn Clock>,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            registry,
            tracker,
            clock,
            pending_ttl,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn pending_ttl(&self) -> Duration {
        self.pending_ttl
    }

    /// Whether a session has outlived the pending TTL at `now`
    pub fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        session.state == SessionState::Pending
            && now.signed_duration_since(session.created_at) >= self.pending_ttl
    }

    /// Enter Pending: register the code and bind the sender
    pub fn open(&self, vcode: VCode, sender: ConnectionId) -> BrokerResult<Session> {
        let now = self.now();
        self.registry.register_with(vcode, sender, now, |session| {
            self.tracker
                .bind(sender, session.vcode.clone(), Role::Sender, now)
                .map(|_| ())
        })
    }

    /// Pending → Paired. Exactly one concurrent caller can win a given code.
    pub fn transition_to_paired(
        &self,
        vcode: &VCode,
        receiver: ConnectionId,
    ) -> BrokerResult<JoinOutcome> {
        let now = self.now();
        self.registry.update(vcode, |session| {
            match session.state {
                SessionState::Paired => return Err(BrokerError::AlreadyPaired(vcode.clone())),
                SessionState::Closed => return Err(BrokerError::NoSuchCode(vcode.clone())),
                SessionState::Pending => {}
            }

            if self.is_expired(session, now) {
                self.tracker.unbind_from(session.sender, vcode);
                session.state = SessionState::Closed;
                return Ok((JoinOutcome::Expired(session.clone()), Retention::Remove));
            }

            self.tracker
                .bind(receiver, vcode.clone(), Role::Receiver, now)?;
            session.receiver = Some(receiver);
            session.state = SessionState::Paired;
            session.paired_at = Some(now);
            Ok((JoinOutcome::Paired(session.clone()), Retention::Keep))
        })
    }

    /// Any active state → Closed, initiated by one of the participants.
    ///
    /// Both parties' bindings are released before the code is freed.
    pub fn close(
        &self,
        vcode: &VCode,
        initiator: ConnectionId,
        reason: CloseReason,
    ) -> BrokerResult<Session> {
        self.registry.update(vcode, |session| {
            if session.role_of(initiator).is_none() {
                return Err(BrokerError::NotBound(initiator));
            }

            for participant in session.participants() {
                self.tracker.unbind_from(participant, vcode);
            }
            session.state = SessionState::Closed;

            tracing::info!(
                vcode = %vcode,
                connection_id = %initiator,
                reason = %reason,
                "Session closed"
            );
            Ok((session.clone(), Retention::Remove))
        })
    }

    /// Close every Pending session older than the TTL
    pub fn expire_pending(&self) -> Vec<Session> {
        let now = self.now();
        self.registry.sweep(|session| {
            if !self.is_expired(session, now) {
                return false;
            }
            self.tracker.unbind_from(session.sender, &session.vcode);
            true
        })
        .into_iter()
        .map(|mut session| {
            session.state = SessionState::Closed;
            session
        })
        .collect()
    }
}
