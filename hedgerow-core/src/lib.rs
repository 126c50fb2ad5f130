#![warn(missing_docs)]
//! # hedgerow-core
//!
//! Core types for the hedgerow resilience toolkit.
//!
//! This crate provides the leaf abstractions shared by every resilience
//! strategy:
//!
//! - **Record** what an attempt produced ([`Outcome`])
//! - **Carry** caller state through an execution ([`ResilienceContext`],
//!   [`ResilienceProperties`])
//! - **Report** what strategies did ([`ResilienceEvent`])
//! - **Decide** whether an outcome is handled ([`OutcomePredicate`])

pub mod context;
pub mod outcome;
pub mod predicate;
pub mod properties;

pub use context::{ResilienceContext, ResilienceEvent, ResilienceEventSeverity, ResilienceEvents};
pub use outcome::{ExecutionError, Failure, Outcome};
pub use predicate::{
    And, BoxOutcomePredicate, HandleFailures, HandleNothing, Not, Or, OutcomePredicate,
    PredicateExt, predicate_fn,
};
pub use properties::{ResilienceProperties, ResiliencePropertyKey};
#[doc(hidden)]
pub use smol_str::SmolStr;
#[doc(hidden)]
pub use tokio_util::sync::CancellationToken;
