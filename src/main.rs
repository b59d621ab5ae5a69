//! chat-relay - Entry Point
//!
//! Multi-user chat relay: clients log in under a display name, join named
//! groups, and exchange text and files routed by the hub.

use log::{error, info};

use chat_relay::{Hub, Server, ServerConfig};

#[tokio::main]
async fn main() {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Launching chat relay...");

    let (hub, handle) = Hub::new(config.event_queue_capacity);
    tokio::spawn(hub.run());

    let server = match Server::bind(config, handle).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            std::process::exit(1);
        }
    };
    server.start().await;
}
