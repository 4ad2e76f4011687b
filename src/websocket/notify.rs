//! Pushes session state changes to the connections involved.
//!
//! Delivery never waits on a slow client: a full channel loses the message.

use crate::broker::{ClosedSession, ConnectionId, Role, Session};
use crate::connection_manager::ConnectionManager;

use super::message::ServerMessage;

/// Tell both parties of a freshly paired session who they are
pub fn notify_paired(connections: &ConnectionManager, session: &Session) {
    let vcode = session.vcode.to_string();
    let parties = [(Some(session.sender), Role::Sender), (session.receiver, Role::Receiver)];

    for (connection_id, role) in parties {
        let Some(connection_id) = connection_id else {
            continue;
        };
        let message = ServerMessage::Paired {
            vcode: vcode.clone(),
            role,
        };
        if let Err(e) = connections.send_to(connection_id, message) {
            tracing::debug!(
                connection_id = %connection_id,
                vcode = %vcode,
                error = %e,
                "Could not deliver paired notification"
            );
        }
    }
}

/// Tell the participants of a closed session, except `skip`, that it is gone
pub fn notify_closed(
    connections: &ConnectionManager,
    closed: &ClosedSession,
    skip: Option<ConnectionId>,
) {
    let vcode = closed.session.vcode.to_string();
    for connection_id in closed.session.participants() {
        if Some(connection_id) == skip {
            continue;
        }
        let message = ServerMessage::SessionClosed {
            vcode: vcode.clone(),
            reason: closed.reason,
        };
        if let Err(e) = connections.send_to(connection_id, message) {
            tracing::debug!(
                connection_id = %connection_id,
                vcode = %vcode,
                error = %e,
                "Could not deliver session_closed notification"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{CloseReason, SessionState, VCode};
    use chrono::Utc;
    use tokio::sync::mpsc;

    #[test]
    fn test_notify_closed_skips_initiator() {
        let connections = ConnectionManager::new(10);
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = connections.register(tx_a).unwrap();
        let b = connections.register(tx_b).unwrap();

        let vcode = VCode::parse("ABC123", 64).unwrap();
        let mut session = Session::pending(vcode, a.id, Utc::now());
        session.receiver = Some(b.id);
        session.state = SessionState::Closed;
        let closed = ClosedSession {
            session,
            reason: CloseReason::SenderDisconnected,
        };

        notify_closed(&connections, &closed, Some(a.id));

        assert!(rx_a.try_recv().is_err());
        assert!(matches!(
            rx_b.try_recv(),
            Ok(ServerMessage::SessionClosed { reason: CloseReason::SenderDisconnected, .. })
        ));
    }

    #[test]
    fn test_notify_paired_reaches_both_roles() {
        let connections = ConnectionManager::new(10);
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = connections.register(tx_a).unwrap();
        let b = connections.register(tx_b).unwrap();

        let vcode = VCode::parse("ABC123", 64).unwrap();
        let mut session = Session::pending(vcode, a.id, Utc::now());
        session.receiver = Some(b.id);
        session.state = SessionState::Paired;

        notify_paired(&connections, &session);

        assert!(matches!(
            rx_a.try_recv(),
            Ok(ServerMessage::Paired { role: Role::Sender, .. })
        ));
        assert!(matches!(
            rx_b.try_recv(),
            Ok(ServerMessage::Paired { role: Role::Receiver, .. })
        ));
    }

    #[test]
    fn test_backlogged_party_does_not_block_the_other() {
        let connections = ConnectionManager::new(10);
        let (tx_a, mut rx_a) = mpsc::channel(1);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let a = connections.register(tx_a).unwrap();
        let b = connections.register(tx_b).unwrap();
        fill_channel(&connections, a.id);

        let vcode = VCode::parse("ABC123", 64).unwrap();
        let mut session = Session::pending(vcode, a.id, Utc::now());
        session.receiver = Some(b.id);
        session.state = SessionState::Paired;

        notify_paired(&connections, &session);

        assert!(matches!(rx_a.try_recv(), Ok(ServerMessage::Heartbeat)));
        assert!(rx_a.try_recv().is_err());
        assert!(matches!(
            rx_b.try_recv(),
            Ok(ServerMessage::Paired { role: Role::Receiver, .. })
        ));
    }

    fn fill_channel(connections: &ConnectionManager, id: ConnectionId) {
        connections.send_to(id, ServerMessage::Heartbeat).unwrap();
    }
}
