//! Outcome predicates.
//!
//! A predicate decides whether an [`Outcome`] should be *handled* by a
//! strategy. For hedging, a handled outcome is one that must not win the race:
//! the strategy keeps waiting for, or launching, other attempts.
//!
//! ## Composability
//!
//! Predicates compose with logical combinators:
//!
//! - [`Not`] - Inverts a predicate result
//! - [`And`] - Both predicates must handle the outcome
//! - [`Or`] - Either predicate handling the outcome is sufficient

pub mod builtin;
pub mod combinators;

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ResilienceContext;
use crate::outcome::Outcome;

pub use builtin::{FnPredicate, HandleFailures, HandleNothing, predicate_fn};
pub use combinators::{And, Not, Or, PredicateExt};

/// Boxed outcome predicate for dynamic dispatch.
pub type BoxOutcomePredicate<T> = Box<dyn OutcomePredicate<T>>;

/// Decides whether an outcome is handled by a strategy.
///
/// The predicate may be asynchronous; it is evaluated on the task that ran the
/// attempt, right after the attempt finished.
#[async_trait]
pub trait OutcomePredicate<T>: Send + Sync {
    /// Returns `true` if the outcome is handled.
    async fn check(&self, outcome: &Outcome<T>, context: &ResilienceContext) -> bool;
}

#[async_trait]
impl<T, P> OutcomePredicate<T> for Box<P>
where
    T: Send + Sync,
    P: OutcomePredicate<T> + ?Sized,
{
    async fn check(&self, outcome: &Outcome<T>, context: &ResilienceContext) -> bool {
        self.as_ref().check(outcome, context).await
    }
}

#[async_trait]
impl<T, P> OutcomePredicate<T> for Arc<P>
where
    T: Send + Sync,
    P: OutcomePredicate<T> + ?Sized,
{
    async fn check(&self, outcome: &Outcome<T>, context: &ResilienceContext) -> bool {
        self.as_ref().check(outcome, context).await
    }
}

#[async_trait]
impl<T, P> OutcomePredicate<T> for &P
where
    T: Send + Sync,
    P: OutcomePredicate<T> + ?Sized,
{
    async fn check(&self, outcome: &Outcome<T>, context: &ResilienceContext) -> bool {
        (*self).check(outcome, context).await
    }
}
