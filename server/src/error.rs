//! Error taxonomy for the game server.
//!
//! Every failure is scoped to a single connection or a single rejected
//! operation; nothing here takes the process down once the listener is bound.

use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Malformed or out-of-place packets.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unexpected {0} packet")]
    Unexpected(&'static str),
    #[error("connection closed before joining a table")]
    ClosedBeforeJoin,
    #[error("no join received within {0:?}")]
    JoinTimeout(Duration),
}

/// Rejected requests. The message is sent back to the offending client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("table has already started")]
    TableStarted,
    #[error("player {0} is already seated at this table")]
    DuplicatePlayer(String),
    #[error("only the table creator can do that")]
    NotCreator,
    #[error("player is not seated at this table")]
    NotSeated,
    #[error("table is closed")]
    TableClosed,
    #[error("too many players for the deck: {players} seated, {cards} cards to deal")]
    TooManyPlayers { players: usize, cards: usize },
}

/// Reasons a click is dropped without any state change or reply.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StaleInput {
    #[error("table has not started")]
    NotStarted,
    #[error("game is finished")]
    Finished,
    #[error("symbol is not on both the target and the top card")]
    NoMatch,
    #[error("player already claimed this round")]
    AlreadyClaimed,
    #[error("round already closed")]
    RoundClosed,
    #[error("player is not seated")]
    NotSeated,
}

/// Socket-level failures. They remove the player, never the table.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("no pong received for {0:?}")]
    PongTimeout(Duration),
    #[error("outbound queue overflowed")]
    Overflow,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
