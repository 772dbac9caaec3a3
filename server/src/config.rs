//! Runtime policy for tables and connections.

use crate::error::ServerError;
use log::warn;
use shared::{BONUS_DISCARDS, DEFAULT_DECK_ORDER};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Prime order of the generated deck.
    pub deck_order: u32,
    /// How long a round stays open after its first valid click.
    pub click_window: Duration,
    /// Extra cards discarded when winning on one's own avatar symbol.
    pub bonus_discards: usize,
    pub ping_interval: Duration,
    /// Without a pong for this long the connection counts as maximally lagged.
    pub stale_after: Duration,
    /// Without a pong for this long the connection is dropped.
    pub pong_timeout: Duration,
    /// Upper bound on any one-way latency estimate.
    pub max_latency: Duration,
    /// Weight of the newest sample in the latency moving average.
    pub latency_smoothing: f64,
    /// Per-socket outbound queue length before the client is dropped.
    pub outbound_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            deck_order: DEFAULT_DECK_ORDER,
            click_window: Duration::from_millis(200),
            bonus_discards: BONUS_DISCARDS,
            ping_interval: Duration::from_secs(1),
            stale_after: Duration::from_secs(3),
            pong_timeout: Duration::from_secs(10),
            max_latency: Duration::from_millis(100),
            latency_smoothing: 0.25,
            outbound_capacity: 64,
        }
    }
}

impl ServerConfig {
    /// Rejects settings the server cannot run with and warns about
    /// settings that hurt fairness.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.deck_order < 2 {
            return Err(ServerError::Config(format!(
                "deck order must be at least 2, got {}",
                self.deck_order
            )));
        }
        if self.outbound_capacity == 0 {
            return Err(ServerError::Config(
                "outbound capacity must be positive".to_string(),
            ));
        }
        if !(self.latency_smoothing > 0.0 && self.latency_smoothing <= 1.0) {
            return Err(ServerError::Config(format!(
                "latency smoothing must be in (0, 1], got {}",
                self.latency_smoothing
            )));
        }
        if self.ping_interval.is_zero() || self.click_window.is_zero() {
            return Err(ServerError::Config(
                "ping interval and click window must be non-zero".to_string(),
            ));
        }
        if self.pong_timeout <= self.stale_after {
            return Err(ServerError::Config(
                "pong timeout must exceed the staleness threshold".to_string(),
            ));
        }
        if self.click_window < self.max_latency * 2 {
            warn!(
                "Click window {:?} is shorter than twice the latency cap {:?}; slow clients may lose rounds they won",
                self.click_window, self.max_latency
            );
        }
        Ok(())
    }
}
