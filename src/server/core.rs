use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::hub::HubHandle;
use crate::session::handle_client;

pub struct Server {
    listener: TcpListener,
    hub: HubHandle,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Binds the listening socket described by `config`.
    pub async fn bind(config: ServerConfig, hub: HubHandle) -> Result<Self, RelayError> {
        config.validate()?;
        let socket = config.listen_socket();

        let listener = match TcpListener::bind(&socket).await {
            Ok(listener) => {
                info!("Relay bound to {}", socket);
                listener
            }
            Err(e) => {
                error!("Failed to bind to {}: {}", socket, e);
                return Err(e.into());
            }
        };

        Ok(Self {
            listener,
            hub,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, one task per connection. Accept errors
    /// are logged and the loop keeps going.
    pub async fn start(&self) {
        info!(
            "Starting chat relay on {} (mailbox capacity {}, idle timeout {:?})",
            self.config.listen_socket(),
            self.config.mailbox_capacity,
            self.config.idle_timeout()
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        info!("Could not disable Nagle for {}: {}", addr, e);
                    }
                    let hub = self.hub.clone();
                    let config = Arc::clone(&self.config);

                    // Spawn a task for each client so the accept loop doesn't block
                    tokio::spawn(handle_client(stream, Some(addr), hub, config));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;

    fn loopback() -> ServerConfig {
        ServerConfig {
            bind_address: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port() {
        let (_hub, handle) = Hub::new(8);
        let server = Server::bind(loopback(), handle).await.unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let (_hub, handle) = Hub::new(8);
        let config = ServerConfig {
            mailbox_capacity: 0,
            ..loopback()
        };
        assert!(matches!(
            Server::bind(config, handle).await,
            Err(RelayError::Config(_))
        ));
    }
}
