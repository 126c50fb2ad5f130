//! Ready-made outcome predicates.

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;

use super::OutcomePredicate;
use crate::context::ResilienceContext;
use crate::outcome::Outcome;

/// Handles every failure outcome. Success outcomes are not handled.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandleFailures;

#[async_trait]
impl<T> OutcomePredicate<T> for HandleFailures
where
    T: Send + Sync,
{
    async fn check(&self, outcome: &Outcome<T>, _context: &ResilienceContext) -> bool {
        !outcome.has_result()
    }
}

/// Never handles an outcome: the first completed attempt always wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandleNothing;

#[async_trait]
impl<T> OutcomePredicate<T> for HandleNothing
where
    T: Send + Sync,
{
    async fn check(&self, _outcome: &Outcome<T>, _context: &ResilienceContext) -> bool {
        false
    }
}

/// Predicate backed by a synchronous closure.
pub struct FnPredicate<F, T> {
    f: F,
    _phantom: PhantomData<fn(&Outcome<T>)>,
}

impl<F, T> fmt::Debug for FnPredicate<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPredicate").finish()
    }
}

/// Wraps a closure into an [`OutcomePredicate`].
pub fn predicate_fn<F, T>(f: F) -> FnPredicate<F, T>
where
    F: Fn(&Outcome<T>, &ResilienceContext) -> bool + Send + Sync,
{
    FnPredicate {
        f,
        _phantom: PhantomData,
    }
}

#[async_trait]
impl<F, T> OutcomePredicate<T> for FnPredicate<F, T>
where
    T: Send + Sync,
    F: Fn(&Outcome<T>, &ResilienceContext) -> bool + Send + Sync,
{
    async fn check(&self, outcome: &Outcome<T>, context: &ResilienceContext) -> bool {
        (self.f)(outcome, context)
    }
}
