//! Table (game room) state machine.
//!
//! ```text
//!   Lobby ──start──▶ Started ──last card──▶ Finished
//!     │                 ▲   │
//!     │                 └───┘ round resolved
//!     └──cancel──▶ Cancelled
//! ```
//!
//! A table is always accessed through a [`TableHandle`]; every mutation
//! happens under its lock, so all clients observe one sequential history.
//! Transitions end with a full `state` broadcast to every seated player.

use crate::arbitration::{Candidate, ClickOutcome, PendingClick};
use crate::config::ServerConfig;
use crate::error::{StaleInput, ValidationError};
use crate::latency::round_trip;
use crate::player::{Outbox, Player};
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use shared::{generate_deck, Card, Packet, PlayerInfo, Symbol, TableView};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;

pub type TableHandle = Arc<Mutex<Table>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePhase {
    Lobby,
    Started,
    Finished,
    Cancelled,
}

/// Result of a resolved round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    /// The round that was resolved.
    pub round: u32,
    pub winner_id: String,
    pub symbol: Symbol,
    /// Cards discarded on top of the one that became the target.
    pub bonus_discarded: usize,
    pub finished: bool,
}

#[derive(Debug)]
pub struct Table {
    id: String,
    name: String,
    players: Vec<Player>,
    phase: TablePhase,
    target_card: Card,
    round: u32,
    pending: Option<PendingClick>,
    winner_id: Option<String>,
    closed: bool,
    config: Arc<ServerConfig>,
}

impl Table {
    pub fn new(id: impl Into<String>, config: Arc<ServerConfig>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            players: Vec::new(),
            phase: TablePhase::Lobby,
            target_card: Card::default(),
            round: 0,
            pending: None,
            winner_id: None,
            closed: false,
            config,
        }
    }

    pub fn handle(self) -> TableHandle {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> TablePhase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn target_card(&self) -> &Card {
        &self.target_card
    }

    pub fn winner_id(&self) -> Option<&str> {
        self.winner_id.as_deref()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id() == player_id)
    }

    pub fn pending(&self) -> Option<&PendingClick> {
        self.pending.as_ref()
    }

    /// The creator occupies seat 0.
    pub fn is_creator(&self, player_id: &str) -> bool {
        self.players.first().is_some_and(|p| p.id() == player_id)
    }

    /// A closed table is about to leave the registry and accepts nothing.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn seat(&mut self, info: PlayerInfo, outbox: Outbox, now: Instant) -> Result<(), ValidationError> {
        if self.closed {
            return Err(ValidationError::TableClosed);
        }
        if self.phase != TablePhase::Lobby {
            return Err(ValidationError::TableStarted);
        }
        if self.player(&info.id).is_some() {
            return Err(ValidationError::DuplicatePlayer(info.id));
        }

        info!("Player {} ({}) joined table {}", info.id, info.name, self.id);
        self.players.push(Player::new(info, outbox, &self.config, now));
        Ok(())
    }

    /// Removes a player. An open resolution window is left alone, so a
    /// departed player can still win a round they already claimed. The last
    /// player out closes the table.
    pub fn unseat(&mut self, player_id: &str) -> Option<Player> {
        let index = self.players.iter().position(|p| p.id() == player_id)?;
        let player = self.players.remove(index);
        info!("Player {} left table {}", player_id, self.id);

        if self.players.is_empty() {
            self.close_quietly();
        }
        Some(player)
    }

    /// Deals the cards and moves the table into play. Seat 0 only.
    pub fn start<R: Rng + ?Sized>(&mut self, requester: &str, rng: &mut R) -> Result<(), ValidationError> {
        self.require_creator(requester)?;
        if self.phase != TablePhase::Lobby {
            return Err(ValidationError::TableStarted);
        }

        let mut deck = generate_deck(self.config.deck_order);
        // Everyone needs at least one card besides the target.
        if deck.len().saturating_sub(1) < self.players.len() {
            return Err(ValidationError::TooManyPlayers {
                players: self.players.len(),
                cards: deck.len().saturating_sub(1),
            });
        }
        deck.shuffle(rng);
        self.target_card = deck.pop().unwrap_or_default();

        let hand_size = deck.len() / self.players.len();
        let mut cards = deck.into_iter();
        for player in &mut self.players {
            player.hand = cards.by_ref().take(hand_size).collect();
        }

        self.phase = TablePhase::Started;
        self.round = 1;
        self.pending = None;
        info!(
            "Table {} started with {} players, {} cards each",
            self.id,
            self.players.len(),
            hand_size
        );

        self.broadcast_state();
        self.broadcast_update("");
        Ok(())
    }

    /// Tears the table down before play. Seat 0 only. Every seated
    /// connection is told why and then dropped.
    pub fn cancel(&mut self, requester: &str) -> Result<(), ValidationError> {
        self.require_creator(requester)?;
        if self.phase != TablePhase::Lobby {
            return Err(ValidationError::TableStarted);
        }

        self.phase = TablePhase::Cancelled;
        info!("Table {} cancelled by {}", self.id, requester);
        self.broadcast_state();
        self.close("table was cancelled by its creator");
        Ok(())
    }

    /// Closes the table for good: stops the resolution timer, tells every
    /// connection why and kicks it.
    pub fn close(&mut self, reason: &str) {
        for player in &self.players {
            player.send(Packet::error(reason));
            player.kick();
        }
        self.players.clear();
        self.close_quietly();
    }

    fn close_quietly(&mut self) {
        self.closed = true;
        if let Some(mut pending) = self.pending.take() {
            pending.disarm();
        }
    }

    fn require_creator(&self, requester: &str) -> Result<(), ValidationError> {
        if self.closed {
            return Err(ValidationError::TableClosed);
        }
        if self.player(requester).is_none() {
            return Err(ValidationError::NotSeated);
        }
        if !self.is_creator(requester) {
            return Err(ValidationError::NotCreator);
        }
        Ok(())
    }

    /// Registers a click arriving at `arrival`. Invalid clicks change nothing.
    ///
    /// `claimed_round`, when the client sends it, must match the current
    /// round; clicks aimed at a round that already closed are dropped.
    pub fn click(
        &mut self,
        player_id: &str,
        symbol: Symbol,
        claimed_round: Option<u32>,
        arrival: Instant,
    ) -> ClickOutcome {
        match self.phase {
            TablePhase::Started => {}
            TablePhase::Finished => return ClickOutcome::Ignored(StaleInput::Finished),
            TablePhase::Lobby | TablePhase::Cancelled => {
                return ClickOutcome::Ignored(StaleInput::NotStarted)
            }
        }
        if claimed_round.is_some_and(|round| round != self.round) {
            return ClickOutcome::Ignored(StaleInput::RoundClosed);
        }

        let Some(player) = self.player(player_id) else {
            return ClickOutcome::Ignored(StaleInput::NotSeated);
        };
        let Some(top_card) = player.top_card() else {
            return ClickOutcome::Ignored(StaleInput::NoMatch);
        };
        if !top_card.contains(symbol) || !self.target_card.contains(symbol) {
            return ClickOutcome::Ignored(StaleInput::NoMatch);
        }
        if self.pending.as_ref().is_some_and(|p| p.has_claimed(player_id)) {
            return ClickOutcome::Ignored(StaleInput::AlreadyClaimed);
        }

        let candidate = Candidate {
            player_id: player_id.to_string(),
            symbol,
            card: top_card.clone(),
            arrival,
            latency: player.latency.one_way(arrival),
        };
        debug!(
            "Table {} round {}: {} claims symbol {} (latency {:?})",
            self.id, self.round, player_id, symbol, candidate.latency
        );

        match self.pending.as_mut() {
            Some(pending) => pending.offer(candidate),
            None => {
                self.pending = Some(PendingClick::open(self.round, candidate));
                ClickOutcome::Opened { round: self.round }
            }
        }
    }

    /// Attaches the resolution timer to the open window.
    pub fn arm_pending(&mut self, timer: AbortHandle) {
        match self.pending.as_mut() {
            Some(pending) => pending.arm(timer),
            None => timer.abort(),
        }
    }

    /// Closes the window for `round` and applies its outcome. Returns `None`
    /// when there is nothing to resolve for that round.
    pub fn resolve_round(&mut self, round: u32) -> Option<RoundResult> {
        if self.phase != TablePhase::Started {
            return None;
        }
        let pending = match self.pending.take() {
            Some(pending) if pending.round == round => pending,
            other => {
                self.pending = other;
                return None;
            }
        };

        let best = pending.best;
        let mut bonus_discarded = 0;
        let mut finished = false;

        match self.players.iter_mut().find(|p| p.info.id == best.player_id) {
            Some(winner) => {
                self.target_card = winner.hand.pop_front().unwrap_or(best.card);
                if best.symbol == winner.info.symbol {
                    bonus_discarded = self.config.bonus_discards.min(winner.hand.len());
                    winner.hand.drain(..bonus_discarded);
                }
                finished = winner.hand.is_empty();
            }
            // The winner left mid-window; their committed card still becomes the target.
            None => self.target_card = best.card,
        }

        self.round += 1;
        info!(
            "Table {} round {} won by {} on symbol {}{}",
            self.id,
            round,
            best.player_id,
            best.symbol,
            if bonus_discarded > 0 {
                format!(" (+{} bonus discards)", bonus_discarded)
            } else {
                String::new()
            }
        );

        if finished {
            self.phase = TablePhase::Finished;
            self.winner_id = Some(best.player_id.clone());
            info!("Table {} finished, {} wins", self.id, best.player_id);
        }

        self.broadcast_update(&best.player_id);
        self.broadcast_state();

        Some(RoundResult {
            round,
            winner_id: best.player_id,
            symbol: best.symbol,
            bonus_discarded,
            finished,
        })
    }

    /// Folds a pong into the sender's latency estimate.
    pub fn record_pong(
        &mut self,
        player_id: &str,
        server_time: i64,
        now_nanos: i64,
        now: Instant,
    ) -> Option<Duration> {
        let rtt = round_trip(server_time, now_nanos)?;
        let player = self.player_mut(player_id)?;
        let one_way = player.latency.record_rtt(rtt, now);
        debug!(
            "Player {} rtt {:?}, one-way estimate {:?}",
            player_id, rtt, one_way
        );
        Some(one_way)
    }

    pub fn snapshot(&self) -> TableView {
        TableView {
            id: self.id.clone(),
            name: self.name.clone(),
            players: self.players.iter().map(Player::view).collect(),
            started: matches!(self.phase, TablePhase::Started | TablePhase::Finished),
            finished: self.phase == TablePhase::Finished,
            target_card: self.target_card.clone(),
            round: self.round,
            winner_id: self.winner_id.clone(),
        }
    }

    pub fn broadcast(&self, packet: &Packet) {
        for player in &self.players {
            player.send(packet.clone());
        }
    }

    pub fn broadcast_state(&self) {
        self.broadcast(&Packet::State {
            table: self.snapshot(),
        });
    }

    /// Sends every player the shared target card along with their own top card.
    fn broadcast_update(&self, winner_id: &str) {
        for player in &self.players {
            player.send(Packet::Update {
                target_card: self.target_card.clone(),
                top_card: player.top_card().cloned().unwrap_or_default(),
                round: self.round,
                winner_id: winner_id.to_string(),
            });
        }
    }

    pub fn send_to(&self, player_id: &str, packet: Packet) -> bool {
        self.player(player_id).is_some_and(|p| p.send(packet))
    }
}
