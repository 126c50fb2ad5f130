//! Error types for hedging configuration.

use thiserror::Error;

/// Error raised while configuring a hedging strategy.
///
/// Attempt failures never surface through this type; they travel as
/// [`Outcome::Failure`](hedgerow_core::Outcome::Failure) values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HedgingError {
    /// The attempt budget is outside the supported range.
    #[error("max attempts must be within {min}..={max}, got {value}")]
    InvalidMaxAttempts {
        /// Rejected value.
        value: u8,
        /// Smallest accepted value.
        min: u8,
        /// Largest accepted value.
        max: u8,
    },
}
