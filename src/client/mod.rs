//! Relay client
//!
//! Connection core for programs that talk to the relay: presentation layers
//! push envelopes with `send` and drain decoded ones with `recv`.

pub mod connection;

pub use connection::{CLIENT_QUEUE_CAPACITY, ChatClient};
