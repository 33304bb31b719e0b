//! Reconnect backoff policy

use std::time::Duration;

use rand::Rng;

use super::ConfigError;

/// Exponential reconnect backoff with jitter.
///
/// The attempt counter is owned by the caller; it is reset once a session has
/// stayed connected for `reset_after`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    /// Fraction of the delay that is randomized, in `0.0..=1.0`
    pub jitter: f64,
    pub reset_after: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.5,
            reset_after: Duration::from_secs(60),
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay.is_zero() {
            return Err(ConfigError::InvalidValue(
                "BACKOFF_INITIAL_MS",
                "must be > 0".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConfigError::InvalidValue(
                "BACKOFF_MAX_MS",
                "must be >= the initial delay".to_string(),
            ));
        }
        if self.factor < 1.0 || !self.factor.is_finite() {
            return Err(ConfigError::InvalidValue(
                "BACKOFF_FACTOR",
                "must be >= 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) || !self.jitter.is_finite() {
            return Err(ConfigError::InvalidValue(
                "BACKOFF_JITTER",
                "must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay before reconnect attempt number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let exponent = self.factor.powf(f64::from(attempt.min(64)));
        let base = (initial * exponent).min(max);

        if self.jitter == 0.0 || base == 0.0 {
            return Duration::from_secs_f64(base);
        }

        let randomized = rand::thread_rng().gen_range(0.0..=base);
        let blended = base * (1.0 - self.jitter) + randomized * self.jitter;
        Duration::from_secs_f64(blended)
    }
}
