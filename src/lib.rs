pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod server;
pub mod session;

pub use client::ChatClient;
pub use config::ServerConfig;
pub use error::RelayError;
pub use hub::{Hub, HubHandle};
pub use protocol::{FilePayload, Message, MessageKind, PresencePayload};
pub use server::Server;
