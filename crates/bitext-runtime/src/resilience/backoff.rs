//! Pause between alignment attempts.

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_str;

/// Exponential pause before attempts 2..n, built with `backon`.
///
/// The pause before the second attempt is `min_delay`; each later pause
/// is multiplied by `factor` and capped at `max_delay`. A zero `min_delay`
/// (the default) retries immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBackoff {
    #[serde(with = "duration_str")]
    pub min_delay: Duration,

    #[serde(with = "duration_str")]
    pub max_delay: Duration,

    pub factor: f32,

    pub jitter: bool,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            jitter: false,
        }
    }
}

impl RetryBackoff {
    /// No pause at all.
    pub fn immediate() -> Self {
        Self::default()
    }

    pub fn exponential(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn is_immediate(&self) -> bool {
        self.min_delay.is_zero()
    }

    fn builder(&self, times: usize) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay.max(self.min_delay))
            .with_factor(self.factor.max(1.0))
            .with_max_times(times);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }

    /// Pauses for the retries following the first attempt.
    pub fn delays(&self, retries: usize) -> Vec<Duration> {
        if self.is_immediate() {
            return vec![Duration::ZERO; retries];
        }
        self.builder(retries).build().collect()
    }
}
