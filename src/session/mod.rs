//! Client sessions
//!
//! One session per accepted connection: an inbound loop feeding the hub and an
//! outbound loop draining the session's mailbox.

pub mod handle;
pub mod handler;
pub mod operations;
pub mod state;

pub use handle::{Session, SessionId};
pub use handler::handle_client;
pub use state::SessionState;
