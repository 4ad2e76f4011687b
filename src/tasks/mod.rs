mod heartbeat;
mod sweeper;

pub use heartbeat::{HeartbeatRound, HeartbeatTask};
pub use sweeper::PendingSweeper;
