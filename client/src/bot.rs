//! Headless player that joins a table and plays it to the end.

use crate::error::ClientError;
use crate::game::ClientGameState;
use crate::network::Client;
use log::{debug, info, warn};
use shared::{timestamp_nanos, Packet, PlayerInfo, Symbol};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// e.g. `ws://127.0.0.1:8080`
    pub server_url: String,
    pub table_id: String,
    pub player: PlayerInfo,
    /// Simulated extra round-trip latency.
    pub fake_ping: Duration,
    /// Delay between seeing a new round and clicking.
    pub reaction_delay: Duration,
    /// When seated first, start the game once this many players are seated.
    pub start_when: Option<usize>,
}

/// How a bot's session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotOutcome {
    Won,
    Lost { winner_id: String },
    Rejected(String),
    Closed,
}

pub struct Bot {
    config: BotConfig,
    client: Client,
    game: ClientGameState,
    /// Click scheduled for after the reaction delay.
    pending_click: Option<(Instant, Symbol, u32)>,
}

impl Bot {
    pub async fn connect(config: BotConfig) -> Result<Self, ClientError> {
        let client = Client::connect(&config.server_url, config.fake_ping).await?;
        Ok(Bot {
            game: ClientGameState::new(config.player.id.clone()),
            config,
            client,
            pending_click: None,
        })
    }

    /// Joins the configured table and plays until the game ends, the server
    /// rejects us or the socket closes.
    pub async fn run(mut self) -> Result<BotOutcome, ClientError> {
        self.client
            .send(&Packet::Join {
                table_id: self.config.table_id.clone(),
                player: self.config.player.clone(),
            })
            .await?;
        info!(
            "{} joining table {}",
            self.config.player.id, self.config.table_id
        );

        let outcome = loop {
            let click_at = self.pending_click.map(|(at, _, _)| at);
            tokio::select! {
                packet = self.client.recv() => {
                    let Some(packet) = packet? else {
                        break BotOutcome::Closed;
                    };
                    self.client.delay_inbound().await;
                    if let Some(outcome) = self.handle_packet(packet).await? {
                        break outcome;
                    }
                }
                _ = sleep_until(click_at.unwrap_or_else(Instant::now)), if click_at.is_some() => {
                    if let Some((_, symbol, round)) = self.pending_click.take() {
                        debug!("{} clicks {} in round {}", self.config.player.id, symbol, round);
                        self.client
                            .send(&Packet::Click {
                                symbol,
                                round: Some(round),
                            })
                            .await?;
                    }
                }
            }
        };

        info!("{} finished: {:?}", self.config.player.id, outcome);
        if outcome != BotOutcome::Closed {
            if let Err(e) = self.client.close().await {
                debug!("Error closing connection: {}", e);
            }
        }
        Ok(outcome)
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<Option<BotOutcome>, ClientError> {
        match packet {
            Packet::Ping { server_time } => {
                self.client
                    .send(&Packet::Pong {
                        server_time,
                        client_time: timestamp_nanos(),
                    })
                    .await?;
            }
            Packet::State { table } => {
                self.game.apply_state(table);
                if self.game.is_finished() {
                    return Ok(Some(match self.game.winner_id() {
                        Some(winner) if winner == self.game.player_id => BotOutcome::Won,
                        winner => BotOutcome::Lost {
                            winner_id: winner.unwrap_or_default().to_string(),
                        },
                    }));
                }
                if self.game.take_start(self.config.start_when) {
                    info!("{} starting table {}", self.config.player.id, self.config.table_id);
                    self.client.send(&Packet::Start).await?;
                }
            }
            Packet::Update {
                target_card,
                top_card,
                round,
                winner_id,
            } => {
                self.game.apply_update(target_card, top_card, round, &winner_id);
                self.schedule_click();
            }
            Packet::Error { message } => {
                warn!("{} rejected: {}", self.config.player.id, message);
                return Ok(Some(BotOutcome::Rejected(message)));
            }
            Packet::Chat { player_id, text } => info!("<{}> {}", player_id, text),
            other => warn!("Unexpected {} packet from server", other.kind()),
        }
        Ok(None)
    }

    fn schedule_click(&mut self) {
        if let Some((symbol, round)) = self.game.take_click() {
            self.pending_click = Some((Instant::now() + self.config.reaction_delay, symbol, round));
        }
    }
}
