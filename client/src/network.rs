use crate::error::ClientError;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use shared::Packet;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// WebSocket connection to the game server speaking JSON packets.
pub struct Client {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
    fake_ping: Duration,
}

impl Client {
    /// `fake_ping` is added to every round trip, half on each direction.
    pub async fn connect(url: &str, fake_ping: Duration) -> Result<Self, ClientError> {
        info!("Connecting to {}...", url);
        let (socket, _) = connect_async(url).await?;
        Ok(Client { socket, fake_ping })
    }

    pub async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        if !self.fake_ping.is_zero() {
            sleep(self.fake_ping / 2).await;
        }

        self.socket.send(Message::text(packet.to_json()?)).await?;
        Ok(())
    }

    /// Next packet from the server, or `None` once the socket is closed.
    /// Cancel-safe; the inbound half of the fake ping is applied by
    /// [`Client::delay_inbound`].
    pub async fn recv(&mut self) -> Result<Option<Packet>, ClientError> {
        loop {
            let message = match self.socket.next().await {
                Some(message) => message?,
                None => return Ok(None),
            };

            match message {
                Message::Text(text) => return Ok(Some(Packet::from_json(text.as_str())?)),
                Message::Close(frame) => {
                    debug!("Server closed the connection: {:?}", frame);
                    return Ok(None);
                }
                _ => continue,
            }
        }
    }

    /// Simulated delay for a packet that just arrived.
    pub async fn delay_inbound(&self) {
        if !self.fake_ping.is_zero() {
            sleep(self.fake_ping / 2).await;
        }
    }

    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.socket.close(None).await?;
        Ok(())
    }
}
