//! Logical combinators for composing outcome predicates.
//!
//! ```ignore
//! use hedgerow_core::predicate::{HandleFailures, PredicateExt};
//!
//! let predicate = HandleFailures.or(slow_response).not();
//! ```

use async_trait::async_trait;

use super::OutcomePredicate;
use crate::context::ResilienceContext;
use crate::outcome::Outcome;

/// Inverts a predicate result.
#[derive(Debug)]
pub struct Not<P> {
    predicate: P,
}

impl<P> Not<P> {
    /// Creates a new `Not` combinator wrapping the given predicate.
    pub fn new(predicate: P) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl<T, P> OutcomePredicate<T> for Not<P>
where
    T: Send + Sync,
    P: OutcomePredicate<T>,
{
    async fn check(&self, outcome: &Outcome<T>, context: &ResilienceContext) -> bool {
        !self.predicate.check(outcome, context).await
    }
}

/// Requires both predicates to handle the outcome.
///
/// Short-circuits: the right predicate is not evaluated when the left one
/// does not handle the outcome.
#[derive(Debug)]
pub struct And<L, R> {
    left: L,
    right: R,
}

impl<L, R> And<L, R> {
    /// Creates a new `And` combinator from two predicates.
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }
}

#[async_trait]
impl<T, L, R> OutcomePredicate<T> for And<L, R>
where
    T: Send + Sync,
    L: OutcomePredicate<T>,
    R: OutcomePredicate<T>,
{
    async fn check(&self, outcome: &Outcome<T>, context: &ResilienceContext) -> bool {
        self.left.check(outcome, context).await && self.right.check(outcome, context).await
    }
}

/// Requires either predicate to handle the outcome.
///
/// Short-circuits: the right predicate is not evaluated when the left one
/// already handles the outcome.
#[derive(Debug)]
pub struct Or<L, R> {
    left: L,
    right: R,
}

impl<L, R> Or<L, R> {
    /// Creates a new `Or` combinator from two predicates.
    pub fn new(left: L, right: R) -> Self {
        Self { left, right }
    }
}

#[async_trait]
impl<T, L, R> OutcomePredicate<T> for Or<L, R>
where
    T: Send + Sync,
    L: OutcomePredicate<T>,
    R: OutcomePredicate<T>,
{
    async fn check(&self, outcome: &Outcome<T>, context: &ResilienceContext) -> bool {
        self.left.check(outcome, context).await || self.right.check(outcome, context).await
    }
}

/// Fluent composition for outcome predicates.
pub trait PredicateExt: Sized {
    /// Inverts this predicate.
    fn not(self) -> Not<Self> {
        Not::new(self)
    }

    /// Combines this predicate with `other` using AND semantics.
    fn and<R>(self, other: R) -> And<Self, R> {
        And::new(self, other)
    }

    /// Combines this predicate with `other` using OR semantics.
    fn or<R>(self, other: R) -> Or<Self, R> {
        Or::new(self, other)
    }

    /// Erases the predicate type for outcomes of type `T`.
    fn boxed<T>(self) -> Box<dyn OutcomePredicate<T>>
    where
        Self: OutcomePredicate<T> + 'static,
    {
        Box::new(self)
    }
}

impl<P> PredicateExt for P {}
