//! Input acceptance policy applied before processing starts.

use crate::error::CoreError;

/// Default minimum accepted duration in seconds.
pub const DEFAULT_MIN_DURATION_SECS: f64 = 29.0;

/// Default maximum accepted duration in seconds (15 minutes).
pub const DEFAULT_MAX_DURATION_SECS: f64 = 900.0;

/// Closed interval of accepted input durations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationPolicy {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DurationPolicy {
    pub fn new(min_secs: f64, max_secs: f64) -> Result<Self, CoreError> {
        if !(min_secs >= 0.0 && max_secs >= min_secs) {
            return Err(CoreError::Validation(format!(
                "Invalid duration bounds: min {min_secs}s, max {max_secs}s"
            )));
        }
        Ok(Self { min_secs, max_secs })
    }

    /// Accept `duration_secs` if it lies within `[min, max]`.
    pub fn check(&self, duration_secs: f64) -> Result<(), CoreError> {
        if !duration_secs.is_finite() {
            return Err(CoreError::Validation(
                "Could not determine audio duration".to_string(),
            ));
        }
        if duration_secs < self.min_secs {
            return Err(CoreError::Validation(format!(
                "File too short: {duration_secs:.1} seconds (minimum duration is {} seconds)",
                self.min_secs
            )));
        }
        if duration_secs > self.max_secs {
            return Err(CoreError::Validation(format!(
                "File too long: {duration_secs:.1} seconds (maximum duration is {} seconds)",
                self.max_secs
            )));
        }
        Ok(())
    }
}

impl Default for DurationPolicy {
    fn default() -> Self {
        Self {
            min_secs: DEFAULT_MIN_DURATION_SECS,
            max_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}
