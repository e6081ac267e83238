//! Reconnect pacing for the relay uplink.

use std::time::Duration;

use rand::Rng;

/// Wait times between reconnect attempts: the floor doubles per failure
/// until it hits the ceiling, and every wait carries a random jitter slice
/// so a fleet of hosts that lost the same relay does not retry in lockstep.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Wait before the first retry; the uplink never retries faster.
    pub floor: Duration,
    /// Upper bound on the wait between retries.
    pub ceiling: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(5),
            ceiling: Duration::from_secs(60),
        }
    }
}

impl ReconnectBackoff {
    /// Wait before retry number `attempt` (0-based): `floor << attempt`,
    /// clamped to the ceiling, plus up to a quarter of itself in jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = match 1u32.checked_shl(attempt) {
            Some(factor) => self.floor.saturating_mul(factor),
            None => self.ceiling,
        };
        let wait = exponential.min(self.ceiling);
        wait + jitter_within(wait / 4)
    }
}

/// A uniformly random duration in `[0, max]`.
fn jitter_within(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max.as_millis() as u64))
}
