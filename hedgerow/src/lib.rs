#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Error types for strategy configuration.
///
/// Defines [`HedgingError`]. Attempt failures are not errors of the strategy;
/// they are carried as [`Outcome`] values.
pub mod error;

/// The hedging strategy and its controller.
///
/// [`HedgingStrategy`] drives the race. The pooled
/// [`HedgingExecutionContext`](hedging::HedgingExecutionContext) underneath
/// tracks attempts, applies the hedging delay, and reconciles the winner's
/// state into the caller context.
pub mod hedging;

/// Metric names for hedging observability.
///
/// Available with the `metrics` feature:
/// - Attempts launched and outcomes accepted, per attempt kind
/// - Background cleanup duration
/// - Offload task counts and durations
#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub mod metrics;

/// Background execution of attempt cleanup.
pub mod offload;

/// Strategy options: attempt budget and hedging delay.
pub mod options;

pub use error::HedgingError;
pub use hedging::{
    DelayArguments, DelayGenerator, HedgeArguments, HedgePredicate, HedgedAction,
    HedgedActionArguments, HedgedActionGenerator, HedgingStrategy, HedgingStrategyBuilder,
    action_fn, delay_fn, hedge_fn,
};
pub use options::{HedgingDelay, HedgingOptions, HedgingOptionsBuilder, MaxAttempts};

pub use hedgerow_core::{
    And, ExecutionError, Failure, HandleFailures, HandleNothing, Not, Or, Outcome,
    OutcomePredicate, PredicateExt, ResilienceContext, ResilienceEvent, ResilienceEventSeverity,
    ResilienceProperties, ResiliencePropertyKey, predicate_fn,
};
