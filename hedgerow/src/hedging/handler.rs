//! Hedging handler: the typed collaborators consulted by the controller.
//!
//! A [`HedgingHandler`] is resolved once per strategy configuration and is
//! parameterized by the result type, so no per-call type dispatch happens
//! while racing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use hedgerow_core::{HandleFailures, Outcome, OutcomePredicate, ResilienceContext};

use crate::options::HedgingDelay;

/// Arguments for the hedge-eligibility predicate.
#[derive(Debug, Clone, Copy)]
pub struct HedgeArguments<'a> {
    /// Zero-based index of the attempt about to start. Always >= 1.
    pub attempt: usize,
    /// Caller context of the hedged execution.
    pub context: &'a ResilienceContext,
}

/// Decides whether a secondary attempt should start.
#[async_trait]
pub trait HedgePredicate: Send + Sync {
    /// Returns `false` to reject the attempt.
    async fn should_hedge(&self, args: HedgeArguments<'_>) -> bool;
}

/// Accepts every secondary attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysHedge;

#[async_trait]
impl HedgePredicate for AlwaysHedge {
    async fn should_hedge(&self, _args: HedgeArguments<'_>) -> bool {
        true
    }
}

/// Hedge predicate backed by a synchronous closure.
pub struct HedgeFn<F> {
    f: F,
}

impl<F> fmt::Debug for HedgeFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HedgeFn").finish()
    }
}

/// Wraps a closure into a [`HedgePredicate`].
pub fn hedge_fn<F>(f: F) -> HedgeFn<F>
where
    F: Fn(HedgeArguments<'_>) -> bool + Send + Sync,
{
    HedgeFn { f }
}

#[async_trait]
impl<F> HedgePredicate for HedgeFn<F>
where
    F: Fn(HedgeArguments<'_>) -> bool + Send + Sync,
{
    async fn should_hedge(&self, args: HedgeArguments<'_>) -> bool {
        (self.f)(args)
    }
}

/// Arguments for the hedged action generator.
#[derive(Debug, Clone, Copy)]
pub struct HedgedActionArguments<'a> {
    /// Zero-based index of the attempt about to start. Always >= 1.
    pub attempt: usize,
    /// Caller context of the hedged execution.
    pub primary_context: &'a ResilienceContext,
    /// Isolated context the secondary attempt runs with.
    pub action_context: &'a ResilienceContext,
}

/// Work run by a secondary attempt.
pub enum HedgedAction<T> {
    /// Call the callback passed to `execute` again.
    Callback,
    /// Run this future instead of the callback.
    Future(BoxFuture<'static, Outcome<T>>),
}

impl<T> HedgedAction<T> {
    /// Action running `future`.
    pub fn from_future<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        Self::Future(Box::pin(future))
    }
}

impl<T> fmt::Debug for HedgedAction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback => f.write_str("Callback"),
            Self::Future(_) => f.write_str("Future"),
        }
    }
}

/// Creates the action of each secondary attempt.
///
/// Consulted after the hedge predicate accepted the attempt. Returning
/// `None` rejects it the same way the predicate does.
pub trait HedgedActionGenerator<T>: Send + Sync {
    /// Action for the attempt described by `args`.
    fn generate(&self, args: HedgedActionArguments<'_>) -> Option<HedgedAction<T>>;
}

/// Runs the callback again for every secondary attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepeatCallback;

impl<T> HedgedActionGenerator<T> for RepeatCallback {
    fn generate(&self, _args: HedgedActionArguments<'_>) -> Option<HedgedAction<T>> {
        Some(HedgedAction::Callback)
    }
}

/// Action generator backed by a closure.
pub struct ActionFn<F> {
    f: F,
}

impl<F> fmt::Debug for ActionFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFn").finish()
    }
}

/// Wraps a closure into a [`HedgedActionGenerator`].
pub fn action_fn<F, T>(f: F) -> ActionFn<F>
where
    F: Fn(HedgedActionArguments<'_>) -> Option<HedgedAction<T>> + Send + Sync,
{
    ActionFn { f }
}

impl<F, T> HedgedActionGenerator<T> for ActionFn<F>
where
    F: Fn(HedgedActionArguments<'_>) -> Option<HedgedAction<T>> + Send + Sync,
{
    fn generate(&self, args: HedgedActionArguments<'_>) -> Option<HedgedAction<T>> {
        (self.f)(args)
    }
}

/// Arguments for the delay generator.
#[derive(Debug, Clone, Copy)]
pub struct DelayArguments<'a> {
    /// Number of attempts loaded so far.
    pub attempt: usize,
    /// Caller context of the hedged execution.
    pub context: &'a ResilienceContext,
}

/// Supplies the delay before the next hedged attempt.
#[async_trait]
pub trait DelayGenerator: Send + Sync {
    /// Returns the delay for the current hedging tick.
    async fn delay(&self, args: DelayArguments<'_>) -> HedgingDelay;
}

#[async_trait]
impl DelayGenerator for HedgingDelay {
    async fn delay(&self, _args: DelayArguments<'_>) -> HedgingDelay {
        *self
    }
}

/// Delay generator backed by a synchronous closure.
pub struct DelayFn<F> {
    f: F,
}

impl<F> fmt::Debug for DelayFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayFn").finish()
    }
}

/// Wraps a closure into a [`DelayGenerator`].
pub fn delay_fn<F>(f: F) -> DelayFn<F>
where
    F: Fn(DelayArguments<'_>) -> HedgingDelay + Send + Sync,
{
    DelayFn { f }
}

#[async_trait]
impl<F> DelayGenerator for DelayFn<F>
where
    F: Fn(DelayArguments<'_>) -> HedgingDelay + Send + Sync,
{
    async fn delay(&self, args: DelayArguments<'_>) -> HedgingDelay {
        (self.f)(args)
    }
}

/// Collaborators consulted while racing attempts of result type `T`.
pub struct HedgingHandler<T> {
    should_handle: Arc<dyn OutcomePredicate<T>>,
    should_hedge: Arc<dyn HedgePredicate>,
    action_generator: Arc<dyn HedgedActionGenerator<T>>,
    delay: Arc<dyn DelayGenerator>,
}

impl<T> HedgingHandler<T>
where
    T: Send + Sync + 'static,
{
    /// Handler that hedges on failures with a fixed delay.
    pub fn new(delay: HedgingDelay) -> Self {
        Self {
            should_handle: Arc::new(HandleFailures),
            should_hedge: Arc::new(AlwaysHedge),
            action_generator: Arc::new(RepeatCallback),
            delay: Arc::new(delay),
        }
    }
}

impl<T> HedgingHandler<T> {
    /// Replaces the predicate that decides whether an outcome is handled.
    pub fn with_should_handle(self, predicate: Arc<dyn OutcomePredicate<T>>) -> Self {
        Self {
            should_handle: predicate,
            ..self
        }
    }

    /// Replaces the hedge-eligibility predicate.
    pub fn with_should_hedge(self, predicate: Arc<dyn HedgePredicate>) -> Self {
        Self {
            should_hedge: predicate,
            ..self
        }
    }

    /// Replaces the generator of secondary attempt actions.
    pub fn with_action_generator(self, generator: Arc<dyn HedgedActionGenerator<T>>) -> Self {
        Self {
            action_generator: generator,
            ..self
        }
    }

    /// Replaces the delay generator.
    pub fn with_delay(self, delay: Arc<dyn DelayGenerator>) -> Self {
        Self { delay, ..self }
    }

    pub(crate) async fn should_handle(
        &self,
        outcome: &Outcome<T>,
        context: &ResilienceContext,
    ) -> bool {
        self.should_handle.check(outcome, context).await
    }

    pub(crate) async fn should_hedge(&self, args: HedgeArguments<'_>) -> bool {
        self.should_hedge.should_hedge(args).await
    }

    pub(crate) fn generate_action(
        &self,
        args: HedgedActionArguments<'_>,
    ) -> Option<HedgedAction<T>> {
        self.action_generator.generate(args)
    }

    pub(crate) async fn delay(&self, args: DelayArguments<'_>) -> HedgingDelay {
        self.delay.delay(args).await
    }
}

impl<T> fmt::Debug for HedgingHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HedgingHandler")
            .field("should_handle", &"...")
            .field("should_hedge", &"...")
            .field("action_generator", &"...")
            .field("delay", &"...")
            .finish()
    }
}
