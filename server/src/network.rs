//! WebSocket listener: accepts TCP connections, upgrades them and hands each
//! one to its own connection task.

use crate::config::ServerConfig;
use crate::connection::handle_connection;
use crate::error::ServerError;
use crate::registry::SessionRegistry;
use log::{debug, error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;

/// Main server owning the listener and the table registry
pub struct Server {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
}

impl Server {
    /// Validates the configuration and binds the listening socket.
    pub async fn bind(addr: &str, config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            registry: Arc::new(SessionRegistry::new(Arc::new(config))),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Accept loop. Only returns if the listener itself fails.
    pub async fn run(&self) -> Result<(), ServerError> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        Self::upgrade(stream, peer, registry).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    async fn upgrade(stream: TcpStream, peer: SocketAddr, registry: Arc<SessionRegistry>) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", peer, e);
        }

        match accept_async(stream).await {
            Ok(ws) => {
                info!("New WebSocket connection from {}", peer);
                handle_connection(ws, peer, registry).await;
            }
            Err(e) => error!("WebSocket handshake with {} failed: {}", peer, e),
        }
    }

    /// Closes every table and kicks every seated connection.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = Server::bind("127.0.0.1:0", ServerConfig::default())
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert!(server.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = ServerConfig {
            outbound_capacity: 0,
            ..ServerConfig::default()
        };
        let result = Server::bind("127.0.0.1:0", config).await;
        assert!(matches!(result, Err(ServerError::Config(_))));
    }
}
