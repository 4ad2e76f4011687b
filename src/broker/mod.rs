//! Session broker: vCode lifecycle, receiver admission and disconnect
//! teardown.
//!
//! - `registry`: vCode → session map with per-code locking
//! - `lifecycle`: Pending → Paired → Closed transitions
//! - `tracker`: connection → vCode bindings
//! - `admission`: the public operations used by the HTTP and WebSocket layers

mod admission;
mod clock;
mod code;
mod error;
mod lifecycle;
mod registry;
mod tracker;
mod types;

pub use admission::{AdmissionBroker, BrokerStats};
pub use clock::{Clock, ManualClock, SystemClock};
pub use code::{VCode, SUGGESTED_CODE_LENGTH};
pub use error::{BrokerError, BrokerResult};
pub use lifecycle::{JoinOutcome, SessionLifecycle};
pub use registry::{CodeRegistry, RegistryStats, Retention};
pub use tracker::ConnectionTracker;
pub use types::{
    Binding, CloseReason, ClosedSession, ConnectionId, Role, Session, SessionState, SessionView,
};
