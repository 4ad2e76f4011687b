//! Connection → vCode bindings, used to tear sessions down on disconnect.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::code::VCode;
use super::error::{BrokerError, BrokerResult};
use super::types::{Binding, ConnectionId, Role};

/// Owns the binding of each connection to at most one session.
///
/// The broker always takes the registry entry lock before touching the
/// tracker, never the other way round.
pub struct ConnectionTracker {
    /// connection_id -> binding
    bindings: DashMap<ConnectionId, Binding>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            bindings: DashMap::new(),
        }
    }

    pub fn bind(
        &self,
        connection_id: ConnectionId,
        vcode: VCode,
        role: Role,
        now: DateTime<Utc>,
    ) -> BrokerResult<Binding> {
        match self.bindings.entry(connection_id) {
            Entry::Occupied(entry) => Err(BrokerError::AlreadyBound {
                connection_id,
                vcode: entry.get().vcode.clone(),
            }),
            Entry::Vacant(entry) => {
                let binding = Binding {
                    vcode,
                    role,
                    bound_at: now,
                };
                entry.insert(binding.clone());
                tracing::debug!(
                    connection_id = %connection_id,
                    vcode = %binding.vcode,
                    role = %role,
                    "Connection bound"
                );
                Ok(binding)
            }
        }
    }

    pub fn unbind(&self, connection_id: ConnectionId) -> BrokerResult<Binding> {
        self.bindings
            .remove(&connection_id)
            .map(|(_, binding)| binding)
            .ok_or(BrokerError::NotBound(connection_id))
    }

    /// Drop the binding only if it still points at `vcode`
    pub fn unbind_from(&self, connection_id: ConnectionId, vcode: &VCode) -> bool {
        self.bindings
            .remove_if(&connection_id, |_, binding| &binding.vcode == vcode)
            .is_some()
    }

    pub fn resolve(&self, connection_id: ConnectionId) -> BrokerResult<Binding> {
        self.bindings
            .get(&connection_id)
            .map(|b| b.value().clone())
            .ok_or(BrokerError::NotBound(connection_id))
    }

    pub fn is_bound(&self, connection_id: ConnectionId) -> bool {
        self.bindings.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> VCode {
        VCode::parse(raw, 64).unwrap()
    }

    #[test]
    fn test_bind_resolve_unbind() {
        let tracker = ConnectionTracker::new();
        let conn = ConnectionId::new();

        tracker
            .bind(conn, code("ABC123"), Role::Sender, Utc::now())
            .unwrap();
        let binding = tracker.resolve(conn).unwrap();
        assert_eq!(binding.vcode, code("ABC123"));
        assert_eq!(binding.role, Role::Sender);

        assert_eq!(tracker.unbind(conn).unwrap().vcode, code("ABC123"));
        assert_eq!(tracker.resolve(conn), Err(BrokerError::NotBound(conn)));
        assert_eq!(tracker.unbind(conn), Err(BrokerError::NotBound(conn)));
    }

    #[test]
    fn test_double_bind_rejected() {
        let tracker = ConnectionTracker::new();
        let conn = ConnectionId::new();
        tracker
            .bind(conn, code("first"), Role::Sender, Utc::now())
            .unwrap();

        let err = tracker
            .bind(conn, code("second"), Role::Receiver, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            BrokerError::AlreadyBound {
                connection_id: conn,
                vcode: code("first"),
            }
        );
        assert_eq!(tracker.resolve(conn).unwrap().vcode, code("first"));
    }

    #[test]
    fn test_unbind_from_checks_code() {
        let tracker = ConnectionTracker::new();
        let conn = ConnectionId::new();
        tracker
            .bind(conn, code("current"), Role::Receiver, Utc::now())
            .unwrap();

        assert!(!tracker.unbind_from(conn, &code("stale")));
        assert!(tracker.is_bound(conn));
        assert!(tracker.unbind_from(conn, &code("current")));
        assert!(tracker.is_empty());
    }
}
