//! Adaptive interval between upload attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Bounds and starting point of the upload delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadDelayConfig {
    /// Delay before the first attempt.
    pub initial: Duration,
    /// Delay used after the one-off backoff to `max`.
    pub default: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Multiplier applied after each successful upload, in `(0, 1]`.
    pub decrease_factor: f64,
}

impl UploadDelayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min.is_zero() {
            return Err(ConfigError::InvalidDelay("min delay must be positive".into()));
        }
        if self.max <= self.min {
            return Err(ConfigError::InvalidDelay(format!(
                "max delay ({:?}) must be greater than min delay ({:?})",
                self.max, self.min
            )));
        }
        if !(self.decrease_factor > 0.0 && self.decrease_factor <= 1.0) {
            return Err(ConfigError::InvalidDelay(format!(
                "decrease factor ({}) must be in (0, 1]",
                self.decrease_factor
            )));
        }
        for (name, value) in [("initial", self.initial), ("default", self.default)] {
            if value < self.min || value > self.max {
                return Err(ConfigError::InvalidDelay(format!(
                    "{name} delay ({value:?}) must be within [{:?}, {:?}]",
                    self.min, self.max
                )));
            }
        }
        Ok(())
    }
}

/// Upload interval that tightens on success and backs off once on failure.
///
/// After [`increase_once`](Self::increase_once) the maximum delay is handed out
/// exactly once, then the delay falls back to the default instead of staying at
/// the ceiling.
#[derive(Debug, Clone)]
pub struct DataUploadDelay {
    default: Duration,
    min: Duration,
    max: Duration,
    decrease_factor: f64,
    current: Duration,
}

impl DataUploadDelay {
    pub fn new(config: &UploadDelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            default: config.default,
            min: config.min,
            max: config.max,
            decrease_factor: config.decrease_factor,
            current: config.initial,
        })
    }

    /// The delay to wait before the next attempt.
    pub fn next_upload_delay(&mut self) -> Duration {
        let delay = self.current;
        if self.current == self.max {
            self.current = self.default;
        }
        delay
    }

    /// Shorten the delay after a successful upload, never below `min`.
    pub fn decrease(&mut self) {
        self.current = self.current.mul_f64(self.decrease_factor).max(self.min);
    }

    /// Back off to `max` for one cycle after a failed upload.
    pub fn increase_once(&mut self) {
        self.current = self.max;
    }

    /// Current delay without consuming it.
    pub fn current(&self) -> Duration {
        self.current
    }
}
