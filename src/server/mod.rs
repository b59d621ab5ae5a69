//! Server core functionality
//!
//! Owns the listening socket and hands every accepted connection to its own
//! session task, wired to the shared hub.

pub mod core;

pub use self::core::Server;
