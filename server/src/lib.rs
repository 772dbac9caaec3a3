//! # Game Server Library
//!
//! This library provides the authoritative server for a real-time symbol
//! matching card game. Players gather at named tables, each holding a hand
//! dealt from a deck in which any two cards share exactly one symbol. Every
//! round all players race to spot the symbol their top card shares with the
//! table's target card; the fastest valid claim wins the round.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Game State
//! The server owns every table. Clients only send intents (join, start,
//! cancel, click) and receive full snapshots plus per-player updates. No
//! client ever sees another player's hand.
//!
//! ### Fair Arbitration
//! Clicks arrive over connections with different delays. Each claim is
//! judged by its arrival time minus the claimer's measured one-way latency,
//! within a short resolution window opened by the first valid claim:
//! - The window is anchored at the first claim and never extends
//! - Strictly earlier compensated claims replace the current best
//! - Ties go to whichever claim reached the server first
//!
//! ### Latency Measurement
//! Every connection is probed with timestamped pings. Round trips feed an
//! exponentially weighted estimate; silent connections are treated as
//! maximally lagged and eventually dropped.
//!
//! ## Architecture Design
//!
//! ### One Task Per Connection
//! Each WebSocket gets a reader task (handshake, probe timer, dispatch) and
//! a writer task draining a bounded outbound queue. Broadcasts never block:
//! a client that cannot keep up is kicked.
//!
//! ### Lock Per Table
//! Every table sits behind its own async mutex and all transitions happen
//! under it, so each table has a single total order of events. The registry
//! has its own lock, never held together with a table lock. Resolution
//! timers take the table lock before touching state, so a click racing the
//! deadline is cleanly either in or out.
//!
//! ## Module Organization
//!
//! - `arbitration`: compensated ordering, resolution window and its timer
//! - `config`: runtime policy (deck order, window, probe timing, queue sizes)
//! - `connection`: per-socket handshake, probe loop and packet dispatch
//! - `error`: error taxonomy
//! - `latency`: one-way latency estimation
//! - `network`: TCP listener and WebSocket upgrade
//! - `player`: seated players and their outbound queues
//! - `registry`: table lookup, creation and deletion
//! - `table`: the table state machine
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind("127.0.0.1:8080", ServerConfig::default()).await?;
//!
//!     // Accepts connections until the listener fails:
//!     // - Upgrades each one to WebSocket
//!     // - Seats it at the table named in its first `join`
//!     // - Probes its latency and dispatches its packets
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod arbitration;
pub mod config;
pub mod connection;
pub mod error;
pub mod latency;
pub mod network;
pub mod player;
pub mod registry;
pub mod table;
