mod handler;
mod message;
mod notify;

pub use handler::ws_handler;
pub use message::{ClientMessage, ServerMessage};
pub use notify::{notify_closed, notify_paired};
