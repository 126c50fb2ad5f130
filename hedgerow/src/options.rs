use std::time::Duration;

use bounded_integer::bounded_integer;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::HedgingError;

bounded_integer! {
    /// Total attempt budget, primary included (1-10).
    /// A value of 1 disables hedging: only the primary attempt runs.
    #[repr(u8)]
    pub struct MaxAttempts { 1..=10 }
}

const MIN_ATTEMPTS: u8 = 1;
const MAX_ATTEMPTS: u8 = 10;
const DEFAULT_ATTEMPTS: u8 = 2;
const DEFAULT_DELAY: Duration = Duration::from_secs(2);

impl MaxAttempts {
    /// Validates a raw attempt budget.
    pub fn try_from_u8(value: u8) -> Result<Self, HedgingError> {
        Self::new(value).ok_or(HedgingError::InvalidMaxAttempts {
            value,
            min: MIN_ATTEMPTS,
            max: MAX_ATTEMPTS,
        })
    }

    /// Attempt budget as `usize`.
    pub fn as_usize(self) -> usize {
        usize::from(self.get())
    }
}

impl Default for MaxAttempts {
    fn default() -> Self {
        match Self::new(DEFAULT_ATTEMPTS) {
            Some(attempts) => attempts,
            None => Self::MIN,
        }
    }
}

/// Delay before the next hedged attempt is launched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HedgingDelay {
    /// Launch the next attempt once the delay elapses without an acceptable
    /// outcome (e.g., "500ms", "2s"). A zero delay launches it immediately.
    Fixed(#[serde(with = "humantime_serde")] Duration),
    /// Never launch on a timer: the next attempt starts only once a running
    /// attempt completes with a handled outcome.
    Infinite,
}

impl HedgingDelay {
    /// Delay that launches every attempt without waiting.
    pub const fn immediate() -> Self {
        Self::Fixed(Duration::ZERO)
    }

    /// Returns `true` for a zero fixed delay.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Fixed(delay) if delay.is_zero())
    }
}

impl Default for HedgingDelay {
    fn default() -> Self {
        Self::Fixed(DEFAULT_DELAY)
    }
}

impl From<Duration> for HedgingDelay {
    fn from(delay: Duration) -> Self {
        Self::Fixed(delay)
    }
}

/// Hedging strategy options.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct HedgingOptions {
    /// Strategy instance name used in logs and metrics.
    #[serde(default)]
    pub name: Option<SmolStr>,
    /// Total attempt budget, primary included.
    #[serde(default)]
    pub max_attempts: MaxAttempts,
    /// Delay before each hedged attempt.
    #[serde(default)]
    pub delay: HedgingDelay,
}

impl Default for HedgingOptions {
    fn default() -> Self {
        Self {
            name: None,
            max_attempts: MaxAttempts::default(),
            delay: HedgingDelay::default(),
        }
    }
}

impl HedgingOptions {
    /// Create a new builder for HedgingOptions.
    pub fn builder() -> HedgingOptionsBuilder {
        HedgingOptionsBuilder::default()
    }
}

/// Builder for HedgingOptions.
#[derive(Debug, Clone, Default)]
pub struct HedgingOptionsBuilder {
    name: Option<SmolStr>,
    max_attempts: MaxAttempts,
    delay: HedgingDelay,
}

impl HedgingOptionsBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the strategy name.
    pub fn name(self, name: impl Into<SmolStr>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Set the attempt budget.
    pub fn max_attempts(self, max_attempts: MaxAttempts) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    /// Set the attempt budget from a raw value, validating its range.
    pub fn try_max_attempts(self, max_attempts: u8) -> Result<Self, HedgingError> {
        Ok(self.max_attempts(MaxAttempts::try_from_u8(max_attempts)?))
    }

    /// Set the hedging delay.
    pub fn delay(self, delay: impl Into<HedgingDelay>) -> Self {
        Self {
            delay: delay.into(),
            ..self
        }
    }

    /// Build the HedgingOptions.
    pub fn build(self) -> HedgingOptions {
        HedgingOptions {
            name: self.name,
            max_attempts: self.max_attempts,
            delay: self.delay,
        }
    }
}
