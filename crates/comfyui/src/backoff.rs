//! Delay policy between poll ticks.
//!
//! The default is a fixed interval. [`PollBackoff::Exponential`] grows
//! the delay after every pending tick, clamps it at `max_delay`, and can
//! add jitter. The poller still caps cumulative sleep at the configured
//! total budget, so the choice of policy never changes how long a job
//! may take before it times out.

use std::time::Duration;

use rand::Rng;

/// How the delay evolves between consecutive ticks.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PollBackoff {
    /// Always wait the base interval.
    #[default]
    Fixed,
    /// Multiply the delay by `multiplier` after each tick, up to `max_delay`.
    Exponential {
        multiplier: f64,
        max_delay: Duration,
        /// Randomize each sleep within `[delay / 2, delay]`.
        jitter: bool,
    },
}

impl PollBackoff {
    /// Calculate the delay that follows `current`.
    ///
    /// Exponential delays are clamped to `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        match self {
            PollBackoff::Fixed => current,
            PollBackoff::Exponential {
                multiplier,
                max_delay,
                ..
            } => {
                let next_ms = (current.as_millis() as f64 * multiplier) as u64;
                Duration::from_millis(next_ms).min(*max_delay)
            }
        }
    }

    /// The duration to actually sleep for a nominal `delay`.
    pub fn sleep_for(&self, delay: Duration) -> Duration {
        match self {
            PollBackoff::Exponential { jitter: true, .. } if !delay.is_zero() => {
                let half = delay / 2;
                let spread_ms = (delay - half).as_millis() as u64;
                half + Duration::from_millis(rand::rng().random_range(0..=spread_ms))
            }
            _ => delay,
        }
    }
}
