//! One-way latency estimation from ping/pong round trips.
//!
//! The server stamps each `ping` with its wall-clock time; the client echoes
//! it back in `pong`. Half of the measured round trip is folded into an
//! exponentially weighted average. Connections that stop answering are first
//! treated as maximally lagged and eventually timed out.

use crate::config::ServerConfig;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct LatencyEstimator {
    estimate: Duration,
    samples: u32,
    last_sample: Instant,
    smoothing: f64,
    max_latency: Duration,
    stale_after: Duration,
}

impl LatencyEstimator {
    /// Starts with a zero estimate; the staleness clock runs from `now`.
    pub fn new(config: &ServerConfig, now: Instant) -> Self {
        Self {
            estimate: Duration::ZERO,
            samples: 0,
            last_sample: now,
            smoothing: config.latency_smoothing,
            max_latency: config.max_latency,
            stale_after: config.stale_after,
        }
    }

    /// Folds a measured round trip into the estimate and returns the new
    /// one-way value. The first sample is taken as-is.
    pub fn record_rtt(&mut self, rtt: Duration, now: Instant) -> Duration {
        let one_way = (rtt / 2).min(self.max_latency);

        self.estimate = if self.samples == 0 {
            one_way
        } else {
            let previous = self.estimate.as_secs_f64();
            let blended = previous + self.smoothing * (one_way.as_secs_f64() - previous);
            Duration::from_secs_f64(blended.max(0.0)).min(self.max_latency)
        };

        self.samples = self.samples.saturating_add(1);
        self.last_sample = now;
        self.estimate
    }

    /// Latency used for click compensation at `now`.
    pub fn one_way(&self, now: Instant) -> Duration {
        if self.is_stale(now) {
            self.max_latency
        } else {
            self.estimate
        }
    }

    /// Smoothed estimate regardless of staleness.
    pub fn estimate(&self) -> Duration {
        self.estimate
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_sample) > self.stale_after
    }

    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_sample) > timeout
    }
}

/// Round trip implied by a pong echoing `server_time`, both in Unix nanoseconds.
/// Returns `None` when the echoed stamp lies in the future.
pub fn round_trip(server_time: i64, now_nanos: i64) -> Option<Duration> {
    let elapsed = now_nanos.checked_sub(server_time)?;
    u64::try_from(elapsed).ok().map(Duration::from_nanos)
}
