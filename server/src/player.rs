//! Seated players and their outbound message queues.
//!
//! A [`Player`] is owned by the table it sits at. Besides the game data
//! (identity, avatar symbol, hand) it carries an [`Outbox`]: a bounded
//! handle onto the player's socket writer. Sends never block; a client that
//! cannot keep up with its queue is kicked rather than allowed to stall the
//! rest of the table.

use crate::config::ServerConfig;
use crate::latency::LatencyEstimator;
use log::warn;
use shared::{Card, Packet, PlayerInfo, PlayerView};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

/// Non-blocking handle onto one connection's writer task.
#[derive(Debug, Clone)]
pub struct Outbox {
    sender: mpsc::Sender<Packet>,
    kick: Arc<Notify>,
}

impl Outbox {
    pub fn new(sender: mpsc::Sender<Packet>, kick: Arc<Notify>) -> Self {
        Self { sender, kick }
    }

    /// Creates an outbox together with the receiving end of its queue and
    /// the kick signal its connection should listen on.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Packet>, Arc<Notify>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let kick = Arc::new(Notify::new());
        (Self::new(sender, Arc::clone(&kick)), receiver, kick)
    }

    /// Queues a packet. Returns false if it was dropped, in which case the
    /// connection is also kicked: its queue is either full or its writer is gone.
    pub fn send(&self, packet: Packet) -> bool {
        match self.sender.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(packet)) => {
                warn!(
                    "Outbound queue full, dropping {} packet and kicking connection",
                    packet.kind()
                );
                self.kick();
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.kick();
                false
            }
        }
    }

    /// Asks the owning connection to shut down after flushing its queue.
    pub fn kick(&self) {
        self.kick.notify_one();
    }
}

#[derive(Debug)]
pub struct Player {
    pub info: PlayerInfo,
    /// Front of the queue is the top card.
    pub hand: VecDeque<Card>,
    pub latency: LatencyEstimator,
    outbox: Outbox,
}

impl Player {
    pub fn new(info: PlayerInfo, outbox: Outbox, config: &ServerConfig, now: Instant) -> Self {
        Self {
            info,
            hand: VecDeque::new(),
            latency: LatencyEstimator::new(config, now),
            outbox,
        }
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn top_card(&self) -> Option<&Card> {
        self.hand.front()
    }

    /// Cards left; zero means this player won.
    pub fn score(&self) -> usize {
        self.hand.len()
    }

    pub fn send(&self, packet: Packet) -> bool {
        self.outbox.send(packet)
    }

    pub fn kick(&self) {
        self.outbox.kick();
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.info.id.clone(),
            name: self.info.name.clone(),
            symbol: self.info.symbol,
            score: self.score(),
            in_penalty: self.info.in_penalty,
            latency_ms: self.latency.estimate().as_secs_f64() * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_player(capacity: usize) -> (Player, mpsc::Receiver<Packet>, Arc<Notify>) {
        let (outbox, receiver, kick) = Outbox::channel(capacity);
        let player = Player::new(
            PlayerInfo::new("p1", "Alice", 5),
            outbox,
            &ServerConfig::default(),
            Instant::now(),
        );
        (player, receiver, kick)
    }

    #[test]
    fn test_player_creation() {
        let (player, _receiver, _kick) = test_player(4);
        assert_eq!(player.id(), "p1");
        assert_eq!(player.score(), 0);
        assert!(player.top_card().is_none());
    }

    #[test]
    fn test_top_card_is_front_of_hand() {
        let (mut player, _receiver, _kick) = test_player(4);
        player.hand.push_back(Card::new(vec![1, 2]));
        player.hand.push_back(Card::new(vec![3, 4]));

        assert_eq!(player.top_card(), Some(&Card::new(vec![1, 2])));
        assert_eq!(player.score(), 2);
        assert_eq!(player.view().score, 2);
    }

    #[test]
    fn test_send_delivers_in_order() {
        let (player, mut receiver, _kick) = test_player(4);
        assert!(player.send(Packet::Start));
        assert!(player.send(Packet::Cancel));

        assert_eq!(receiver.try_recv().unwrap(), Packet::Start);
        assert_eq!(receiver.try_recv().unwrap(), Packet::Cancel);
    }

    #[tokio::test]
    async fn test_overflow_kicks_connection() {
        let (player, _receiver, kick) = test_player(1);
        assert!(player.send(Packet::Start));
        assert!(!player.send(Packet::Start));

        // The kick permit is stored, so a later listener still sees it.
        tokio::time::timeout(Duration::from_millis(100), kick.notified())
            .await
            .expect("kick should have been signalled");
    }

    #[tokio::test]
    async fn test_send_to_closed_queue_kicks_connection() {
        let (player, receiver, kick) = test_player(1);
        drop(receiver);
        assert!(!player.send(Packet::Start));

        tokio::time::timeout(Duration::from_millis(100), kick.notified())
            .await
            .expect("a dead writer should kick the reader");
    }

    #[test]
    fn test_view_hides_hand() {
        let (mut player, _receiver, _kick) = test_player(1);
        player.hand.push_back(Card::new(vec![7, 8, 9]));
        let json = serde_json::to_value(player.view()).unwrap();
        assert!(json.get("hand").is_none());
        assert_eq!(json["score"], 1);
    }
}
