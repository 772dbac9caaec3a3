//! Per-connection task: join handshake, latency probe and packet dispatch.
//!
//! Each socket is split in two. A writer task drains the connection's
//! bounded outbound queue into the sink, so a table broadcast never waits
//! on a slow client. The reader side (this module's main loop) owns the
//! probe timer and routes every inbound packet to the seated table.

use crate::arbitration::{submit_click, ClickOutcome};
use crate::config::ServerConfig;
use crate::error::{ProtocolError, ServerError, TransportError, ValidationError};
use crate::player::Outbox;
use crate::registry::SessionRegistry;
use crate::table::TableHandle;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{timestamp_nanos, Packet, PlayerInfo};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// How long the writer gets to flush queued packets once the reader is done.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;
type WsStream<S> = SplitStream<WebSocketStream<S>>;

/// Serves one client from handshake to disconnect. Never fails the caller:
/// every error is logged and ends only this connection.
pub async fn handle_connection<S>(ws: WebSocketStream<S>, peer: SocketAddr, registry: Arc<SessionRegistry>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let config = Arc::clone(registry.config());
    let (sink, mut stream) = ws.split();
    let (outbox, receiver, kick) = Outbox::channel(config.outbound_capacity);
    let writer = tokio::spawn(write_packets(sink, receiver, peer));

    match Session::join(&mut stream, peer, &registry, outbox.clone()).await {
        Ok(session) => {
            match session.run(&mut stream, &kick).await {
                Ok(()) => info!("Player {} disconnected from {}", session.player_id, peer),
                Err(e) => error!("Connection {} ({}) dropped: {}", session.player_id, peer, e),
            }
            registry.leave(&session.table, &session.player_id).await;
        }
        Err(ServerError::Protocol(ProtocolError::ClosedBeforeJoin)) => {
            debug!("Connection {} closed before joining", peer);
        }
        Err(e) => {
            warn!("Rejecting connection {}: {}", peer, e);
            outbox.send(Packet::error(e.to_string()));
        }
    }

    drop(outbox);
    let abort = writer.abort_handle();
    if timeout(WRITER_FLUSH_TIMEOUT, writer).await.is_err() {
        debug!("Writer for {} did not flush in time", peer);
        abort.abort();
    }
}

/// Drains the outbound queue into the socket, then closes it.
async fn write_packets<S>(mut sink: WsSink<S>, mut receiver: mpsc::Receiver<Packet>, peer: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(packet) = receiver.recv().await {
        let text = match packet.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize {} packet: {}", packet.kind(), e);
                continue;
            }
        };
        if let Err(e) = sink.send(Message::text(text)).await {
            debug!("Failed to send to {}: {}", peer, e);
            return;
        }
    }

    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!("Failed to close socket to {}: {}", peer, e);
    }
}

/// Reads the next protocol packet, skipping control frames. `None` means
/// the peer closed the socket.
async fn next_packet<S>(stream: &mut WsStream<S>) -> Option<Result<Packet, ServerError>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = match stream.next().await? {
            Ok(message) => message,
            Err(e) => return Some(Err(TransportError::from(e).into())),
        };

        match message {
            Message::Text(text) => {
                return Some(Packet::from_json(text.as_str()).map_err(|e| ProtocolError::from(e).into()))
            }
            Message::Binary(_) => return Some(Err(ProtocolError::Unexpected("binary").into())),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// A connection that has been seated at a table.
struct Session {
    table: TableHandle,
    table_id: String,
    player_id: String,
    peer: SocketAddr,
    outbox: Outbox,
    registry: Arc<SessionRegistry>,
    config: Arc<ServerConfig>,
}

impl Session {
    /// Waits for the opening `join` and seats the player.
    async fn join<S>(
        stream: &mut WsStream<S>,
        peer: SocketAddr,
        registry: &Arc<SessionRegistry>,
        outbox: Outbox,
    ) -> Result<Self, ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let config = Arc::clone(registry.config());
        let (table_id, player) = Self::await_join(stream, &config).await?;
        let player_id = player.id.clone();

        let table = registry
            .join_or_create(&table_id, player, outbox.clone())
            .await?;
        info!("Player {} joined table {} from {}", player_id, table_id, peer);

        outbox.send(Packet::Ping {
            server_time: timestamp_nanos(),
        });
        table.lock().await.broadcast_state();

        Ok(Self {
            table,
            table_id,
            player_id,
            peer,
            outbox,
            registry: Arc::clone(registry),
            config,
        })
    }

    async fn await_join<S>(
        stream: &mut WsStream<S>,
        config: &ServerConfig,
    ) -> Result<(String, PlayerInfo), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let first = timeout(config.pong_timeout, next_packet(stream))
            .await
            .map_err(|_| ProtocolError::JoinTimeout(config.pong_timeout))?;

        match first {
            None => Err(ProtocolError::ClosedBeforeJoin.into()),
            Some(Err(e)) => Err(e),
            Some(Ok(Packet::Join { table_id, player })) => Ok((table_id, player)),
            Some(Ok(other)) => Err(ProtocolError::Unexpected(other.kind()).into()),
        }
    }

    /// Main loop. Returns `Ok` when the peer leaves or the connection is
    /// kicked, and an error when the socket fails or stops answering pings.
    async fn run<S>(&self, stream: &mut WsStream<S>, kick: &Notify) -> Result<(), ServerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let period = self.config.ping_interval;
        let mut probe = interval_at(Instant::now() + period, period);
        probe.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = kick.notified() => {
                    debug!("Connection {} kicked", self.peer);
                    return Ok(());
                }
                _ = probe.tick() => {
                    if !self.probe().await? {
                        return Ok(());
                    }
                }
                frame = next_packet(stream) => {
                    let arrival = Instant::now();
                    match frame {
                        None => return Ok(()),
                        Some(Ok(packet)) => self.dispatch(packet, arrival).await,
                        Some(Err(ServerError::Protocol(e))) => {
                            warn!("Skipping frame from {}: {}", self.player_id, e);
                        }
                        Some(Err(e)) => return Err(e),
                    }
                }
            }
        }
    }

    /// Sends the next ping. Returns `false` once the player is no longer
    /// seated, and an error if the last pong is too old.
    async fn probe(&self) -> Result<bool, ServerError> {
        let timed_out = {
            let table = self.table.lock().await;
            match table.player(&self.player_id) {
                Some(player) => player
                    .latency
                    .is_timed_out(Instant::now(), self.config.pong_timeout),
                None => return Ok(false),
            }
        };

        if timed_out {
            return Err(TransportError::PongTimeout(self.config.pong_timeout).into());
        }

        self.outbox.send(Packet::Ping {
            server_time: timestamp_nanos(),
        });
        Ok(true)
    }

    async fn dispatch(&self, packet: Packet, arrival: Instant) {
        match packet {
            Packet::Start => {
                let result = self
                    .table
                    .lock()
                    .await
                    .start(&self.player_id, &mut StdRng::from_entropy());
                if let Err(e) = result {
                    self.reject("start", e);
                }
            }
            Packet::Cancel => {
                if let Err(e) = self.registry.cancel(&self.table_id, &self.player_id).await {
                    self.reject("cancel", e);
                }
            }
            Packet::Click { symbol, round } => {
                let outcome = submit_click(&self.table, &self.player_id, symbol, round, arrival).await;
                if let ClickOutcome::Ignored(reason) = outcome {
                    debug!("Ignoring click on {} from {}: {}", symbol, self.player_id, reason);
                }
            }
            Packet::Pong { server_time, .. } => {
                let mut table = self.table.lock().await;
                if table
                    .record_pong(&self.player_id, server_time, timestamp_nanos(), Instant::now())
                    .is_none()
                {
                    debug!("Discarding pong from {} with future timestamp", self.player_id);
                }
            }
            Packet::Chat { text, .. } => {
                self.table.lock().await.broadcast(&Packet::Chat {
                    player_id: self.player_id.clone(),
                    text,
                });
            }
            other => {
                warn!(
                    "Skipping frame from {}: {}",
                    self.player_id,
                    ProtocolError::Unexpected(other.kind())
                );
            }
        }
    }

    fn reject(&self, action: &str, error: ValidationError) {
        info!("Rejected {} from {}: {}", action, self.player_id, error);
        self.outbox.send(Packet::error(error.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    type Client = WebSocketStream<DuplexStream>;

    fn registry(config: ServerConfig) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(Arc::new(config)))
    }

    async fn connect(registry: &Arc<SessionRegistry>) -> Client {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let registry = Arc::clone(registry);
        tokio::spawn(async move {
            let ws = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
            handle_connection(ws, "127.0.0.1:9".parse().unwrap(), registry).await;
        });
        WebSocketStream::from_raw_socket(client_io, Role::Client, None).await
    }

    async fn send(client: &mut Client, packet: Packet) {
        client
            .send(Message::text(packet.to_json().unwrap()))
            .await
            .unwrap();
    }

    /// Next packet from the server, or `None` on close.
    async fn recv(client: &mut Client) -> Option<Packet> {
        loop {
            let message = timeout(Duration::from_secs(2), client.next())
                .await
                .expect("timed out waiting for server")?;
            match message {
                Ok(Message::Text(text)) => return Some(Packet::from_json(text.as_str()).unwrap()),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Next packet of the given kind, skipping pings and others.
    async fn recv_kind(client: &mut Client, kind: &str) -> Packet {
        loop {
            let packet = recv(client).await.expect("connection closed");
            if packet.kind() == kind {
                return packet;
            }
        }
    }

    async fn join(client: &mut Client, table_id: &str, player_id: &str) {
        send(
            client,
            Packet::Join {
                table_id: table_id.to_string(),
                player: PlayerInfo::new(player_id, player_id.to_uppercase(), 3),
            },
        )
        .await;
    }

    #[tokio::test]
    async fn test_join_sends_ping_then_state() {
        let registry = registry(ServerConfig::default());
        let mut client = connect(&registry).await;
        join(&mut client, "t", "a").await;

        assert!(matches!(recv(&mut client).await, Some(Packet::Ping { .. })));
        match recv(&mut client).await {
            Some(Packet::State { table }) => {
                assert_eq!(table.id, "t");
                assert_eq!(table.players.len(), 1);
                assert!(!table.started);
            }
            other => panic!("Expected state, got {:?}", other),
        }
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_first_packet_must_be_join() {
        let registry = registry(ServerConfig::default());
        let mut client = connect(&registry).await;
        send(&mut client, Packet::Start).await;

        assert!(matches!(recv(&mut client).await, Some(Packet::Error { .. })));
        assert!(recv(&mut client).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_join_is_rejected() {
        let registry = registry(ServerConfig::default());
        let mut first = connect(&registry).await;
        join(&mut first, "t", "a").await;
        recv_kind(&mut first, "state").await;

        let mut second = connect(&registry).await;
        join(&mut second, "t", "a").await;
        match recv(&mut second).await {
            Some(Packet::Error { message }) => assert!(message.contains("already seated")),
            other => panic!("Expected error, got {:?}", other),
        }
        assert!(recv(&mut second).await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_state_and_deletes_empty_table() {
        let registry = registry(ServerConfig::default());
        let mut a = connect(&registry).await;
        join(&mut a, "t", "a").await;
        recv_kind(&mut a, "state").await;

        let mut b = connect(&registry).await;
        join(&mut b, "t", "b").await;
        recv_kind(&mut b, "state").await;
        recv_kind(&mut a, "state").await;

        b.close(None).await.unwrap();
        match recv_kind(&mut a, "state").await {
            Packet::State { table } => assert_eq!(table.players.len(), 1),
            _ => unreachable!(),
        }

        a.close(None).await.unwrap();
        for _ in 0..50 {
            if registry.is_empty().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("table was not deleted");
    }

    #[tokio::test]
    async fn test_non_creator_start_gets_error() {
        let registry = registry(ServerConfig::default());
        let mut a = connect(&registry).await;
        join(&mut a, "t", "a").await;
        recv_kind(&mut a, "state").await;
        let mut b = connect(&registry).await;
        join(&mut b, "t", "b").await;
        recv_kind(&mut b, "state").await;

        send(&mut b, Packet::Start).await;
        match recv_kind(&mut b, "error").await {
            Packet::Error { message } => assert!(message.contains("creator")),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_pong_updates_latency_estimate() {
        let registry = registry(ServerConfig::default());
        let mut client = connect(&registry).await;
        join(&mut client, "t", "a").await;

        let server_time = match recv(&mut client).await {
            Some(Packet::Ping { server_time }) => server_time,
            other => panic!("Expected ping, got {:?}", other),
        };
        recv_kind(&mut client, "state").await;
        send(
            &mut client,
            Packet::Pong {
                server_time,
                client_time: timestamp_nanos(),
            },
        )
        .await;

        // A chat round trip orders the check after the pong was handled.
        send(
            &mut client,
            Packet::Chat {
                player_id: String::new(),
                text: "hi".to_string(),
            },
        )
        .await;
        match recv_kind(&mut client, "chat").await {
            Packet::Chat { player_id, text } => {
                assert_eq!(player_id, "a");
                assert_eq!(text, "hi");
            }
            _ => unreachable!(),
        }

        let table = registry.get("t").await.unwrap();
        let guard = table.lock().await;
        assert_eq!(guard.player("a").unwrap().latency.samples(), 1);
    }

    #[tokio::test]
    async fn test_cancel_closes_every_socket() {
        let registry = registry(ServerConfig::default());
        let mut a = connect(&registry).await;
        join(&mut a, "t", "a").await;
        recv_kind(&mut a, "state").await;
        let mut b = connect(&registry).await;
        join(&mut b, "t", "b").await;
        recv_kind(&mut b, "state").await;

        send(&mut a, Packet::Cancel).await;
        for client in [&mut a, &mut b] {
            match recv_kind(client, "error").await {
                Packet::Error { message } => assert!(message.contains("cancelled")),
                _ => unreachable!(),
            }
            assert!(recv(client).await.is_none());
        }
        assert!(registry.get("t").await.is_none());
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let registry = registry(ServerConfig {
            ping_interval: Duration::from_millis(20),
            stale_after: Duration::from_millis(40),
            pong_timeout: Duration::from_millis(80),
            ..ServerConfig::default()
        });
        let mut client = connect(&registry).await;
        join(&mut client, "t", "a").await;

        // Never answer pings; the server drops the socket.
        while recv(&mut client).await.is_some() {}
        for _ in 0..50 {
            if registry.is_empty().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed-out player was not removed");
    }
}
