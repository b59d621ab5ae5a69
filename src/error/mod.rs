//! Error handling
//!
//! Defines error types and handling for the chat relay.

pub mod handlers;
pub mod types;

pub use handlers::{handle_error, is_terminal};
pub use types::*;
