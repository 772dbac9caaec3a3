//! Wire protocol shared by the server and clients.
//!
//! Every frame is a JSON text message shaped as `{"type": <kind>, "payload": {...}}`.
//! Kinds without data (`start`, `cancel`) omit the payload entirely.

use crate::deck::{Card, Symbol};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Packet {
    // Client -> server
    Join {
        table_id: String,
        player: PlayerInfo,
    },
    Start,
    Cancel,
    Click {
        symbol: Symbol,
        /// Round the click is aimed at. Older clients omit it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        round: Option<u32>,
    },
    Pong {
        server_time: i64,
        client_time: i64,
    },

    // Server -> client
    Ping {
        server_time: i64,
    },
    State {
        table: TableView,
    },
    Update {
        target_card: Card,
        top_card: Card,
        round: u32,
        winner_id: String,
    },
    Error {
        message: String,
    },

    // Both directions. The server overwrites `player_id` with the sender.
    Chat {
        #[serde(default)]
        player_id: String,
        text: String,
    },
}

impl Packet {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the packet kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Join { .. } => "join",
            Packet::Start => "start",
            Packet::Cancel => "cancel",
            Packet::Click { .. } => "click",
            Packet::Pong { .. } => "pong",
            Packet::Ping { .. } => "ping",
            Packet::State { .. } => "state",
            Packet::Update { .. } => "update",
            Packet::Error { .. } => "error",
            Packet::Chat { .. } => "chat",
        }
    }

    /// True for kinds a client is allowed to send.
    pub fn is_client_packet(&self) -> bool {
        matches!(
            self,
            Packet::Join { .. }
                | Packet::Start
                | Packet::Cancel
                | Packet::Click { .. }
                | Packet::Pong { .. }
                | Packet::Chat { .. }
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Packet::Error {
            message: message.into(),
        }
    }
}

/// Identity a client presents when joining a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInfo {
    pub id: String,
    pub name: String,
    /// Avatar symbol chosen by the player.
    pub symbol: Symbol,
    #[serde(default)]
    pub in_penalty: bool,
}

impl PlayerInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>, symbol: Symbol) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            symbol,
            in_penalty: false,
        }
    }
}

/// Public view of a seated player. Hands are never sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub symbol: Symbol,
    /// Cards left in hand; zero means the player won.
    pub score: usize,
    pub in_penalty: bool,
    pub latency_ms: f64,
}

/// Full table snapshot carried by `state` packets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableView {
    pub id: String,
    pub name: String,
    pub players: Vec<PlayerView>,
    pub started: bool,
    #[serde(default)]
    pub finished: bool,
    pub target_card: Card,
    pub round: u32,
    #[serde(default)]
    pub winner_id: Option<String>,
}

impl TableView {
    /// Seat 0 is the creator.
    pub fn creator(&self) -> Option<&PlayerView> {
        self.players.first()
    }
}
