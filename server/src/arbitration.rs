//! Latency-compensated click arbitration.
//!
//! Several players may claim the same round within a few milliseconds of
//! each other, and each claim reaches the server after a different network
//! delay. A claim's *compensated time* is its arrival time minus the
//! claimer's estimated one-way latency: an estimate of when the player
//! actually clicked.
//!
//! The first valid claim of a round opens a resolution window anchored at its
//! arrival. Later claims that arrive before the window closes replace the
//! current best only if their compensated time is strictly earlier, so ties
//! go to whoever reached the server first. When the window closes the best
//! claim wins the round. The window never extends, which bounds how long any
//! round can take to resolve.

use crate::error::StaleInput;
use crate::table::TableHandle;
use log::debug;
use shared::{Card, Symbol};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// A valid claim for the current round.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub player_id: String,
    pub symbol: Symbol,
    /// The claimer's top card when the claim was accepted.
    pub card: Card,
    pub arrival: Instant,
    pub latency: Duration,
}

impl Candidate {
    /// True if this claim's compensated time is strictly earlier than
    /// `other`'s. Compares `a1 - l1 < a2 - l2` as `a1 + l2 < a2 + l1` so no
    /// instant is ever moved before the clock's origin.
    pub fn acted_before(&self, other: &Candidate) -> bool {
        self.arrival + other.latency < other.arrival + self.latency
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// First claim of the round; the resolution window is now open.
    Opened { round: u32 },
    /// Claim beat the previous best.
    Replaced { round: u32 },
    /// Claim was valid but not earlier than the current best.
    Kept { round: u32 },
    Ignored(StaleInput),
}

/// In-flight arbitration state for one round.
#[derive(Debug)]
pub struct PendingClick {
    pub round: u32,
    pub best: Candidate,
    /// Arrival of the claim that opened the window.
    pub opened_at: Instant,
    claimants: HashSet<String>,
    timer: Option<AbortHandle>,
}

impl PendingClick {
    pub fn open(round: u32, candidate: Candidate) -> Self {
        let mut claimants = HashSet::new();
        claimants.insert(candidate.player_id.clone());
        Self {
            round,
            opened_at: candidate.arrival,
            best: candidate,
            claimants,
            timer: None,
        }
    }

    pub fn has_claimed(&self, player_id: &str) -> bool {
        self.claimants.contains(player_id)
    }

    /// Considers another claim for the same round.
    pub fn offer(&mut self, candidate: Candidate) -> ClickOutcome {
        if !self.claimants.insert(candidate.player_id.clone()) {
            return ClickOutcome::Ignored(StaleInput::AlreadyClaimed);
        }

        if candidate.acted_before(&self.best) {
            debug!(
                "Round {}: {} displaces {} as earliest claim",
                self.round, candidate.player_id, self.best.player_id
            );
            self.best = candidate;
            ClickOutcome::Replaced { round: self.round }
        } else {
            ClickOutcome::Kept { round: self.round }
        }
    }

    /// When the window closes.
    pub fn deadline(&self, window: Duration) -> Instant {
        self.opened_at + window
    }

    pub fn arm(&mut self, timer: AbortHandle) {
        self.timer = Some(timer);
    }

    /// Stops the resolution timer if it has not fired yet.
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Submits a click to a table and arms the resolution timer when the click
/// opens a new window. `arrival` should be taken as soon as the frame is read.
pub async fn submit_click(
    table: &TableHandle,
    player_id: &str,
    symbol: Symbol,
    claimed_round: Option<u32>,
    arrival: Instant,
) -> ClickOutcome {
    let mut guard = table.lock().await;
    let outcome = guard.click(player_id, symbol, claimed_round, arrival);

    if let ClickOutcome::Opened { round } = outcome {
        let deadline = arrival + guard.config().click_window;
        let timer = schedule_resolution(Arc::clone(table), round, deadline);
        guard.arm_pending(timer);
    }

    outcome
}

/// Spawns the deferred resolution for `round`. The task takes the table lock
/// before touching any state, so a click racing the deadline is either in
/// before the window closes or counted against the next round. Firing after
/// the round already moved on is a no-op.
pub fn schedule_resolution(table: TableHandle, round: u32, deadline: Instant) -> AbortHandle {
    let task = tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        let mut guard = table.lock().await;
        if guard.resolve_round(round).is_none() {
            debug!("Resolution timer for round {} fired with nothing to resolve", round);
        }
    });
    task.abort_handle()
}
