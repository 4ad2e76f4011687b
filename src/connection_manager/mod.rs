//! Live WebSocket connections.
//!
//! This is the transport side of a connection: its outbound channel, activity
//! timestamps and close signal. Which session a connection belongs to is owned
//! by the broker's tracker, not by this module.

mod registry;
mod types;

pub use registry::{ConnectionManager, ConnectionStats};
pub use types::{ConnectionError, ConnectionHandle, DeliveryError};
