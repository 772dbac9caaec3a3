//! # Game Client Library
//!
//! A headless client for the symbol matching card game. It connects to the
//! server over WebSocket, joins a table and plays it automatically: answering
//! latency probes, starting the game when it created the table, and claiming
//! the symbol its top card shares with the target card every round.
//!
//! It is used for load and fairness experiments (several bots with different
//! simulated latencies racing on one table) and by the end-to-end tests.
//!
//! ## Module Organization
//!
//! ### Bot Module (`bot`)
//! The play loop: join, answer pings, start, click, and report how the game
//! ended.
//!
//! ### Game Module (`game`)
//! Client-side mirror of the table as last described by the server:
//! - Latest table snapshot, target card and own top card
//! - Current round and whether it was already claimed
//! - When this client should ask the server to start
//!
//! ### Network Module (`network`)
//! JSON packets over a WebSocket, with optional simulated latency split
//! between both directions.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::bot::{Bot, BotConfig};
//! use shared::PlayerInfo;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bot = Bot::connect(BotConfig {
//!         server_url: "ws://127.0.0.1:8080".to_string(),
//!         table_id: "kitchen".to_string(),
//!         player: PlayerInfo::new("bot-1", "Bot", 5),
//!         fake_ping: Duration::from_millis(40),
//!         reaction_delay: Duration::from_millis(300),
//!         start_when: Some(2),
//!     })
//!     .await?;
//!
//!     let outcome = bot.run().await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod bot;
pub mod error;
pub mod game;
pub mod network;
