//! Reconnection backoff.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Upper bound on any delay, one week.
const MAX_DELAY_CAP_SECS: f64 = 7.0 * 24.0 * 3600.0;

/// Delay schedule between connection attempts.
///
/// The delay starts at the configured minimum, grows by `factor` after
/// every consecutive failure up to the maximum, and drops back to the
/// minimum on [`ReconnectPolicy::reset`].
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    initial: f64,
    max: f64,
    factor: f64,
    jitter: f64,
    delay: f64,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a policy from the `[reconnect]` table.
    pub fn new(config: &ReconnectConfig) -> Self {
        let initial = config.initial_delay_secs.max(0.0).min(MAX_DELAY_CAP_SECS);
        let max = config.max_delay_secs.min(MAX_DELAY_CAP_SECS).max(initial);
        Self {
            initial,
            max,
            factor: config.factor.max(1.0).min(MAX_DELAY_CAP_SECS),
            jitter: config.jitter.max(0.0).min(1.0),
            delay: initial,
            attempts: 0,
        }
    }

    /// Delay to wait before the next attempt. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.delay;
        self.attempts = self.attempts.saturating_add(1);
        self.delay = (self.delay * self.factor).min(self.max);
        if !self.delay.is_finite() {
            self.delay = self.max;
        }

        let secs = if self.jitter > 0.0 {
            let spread = base * self.jitter;
            (base + rand::rng().random_range(-spread..=spread)).max(0.0)
        } else {
            base
        };
        Duration::from_secs_f64(secs)
    }

    /// A connection succeeded; start over from the minimum delay.
    pub fn reset(&mut self) {
        self.delay = self.initial;
        self.attempts = 0;
    }

    /// Number of consecutive failed attempts since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The delay the next call to `next_delay` is based on, without jitter.
    pub fn current_delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay)
    }
}
