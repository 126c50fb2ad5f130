use std::fmt;
use std::future::Future;
use std::sync::Arc;

use hedgerow_core::{ExecutionError, Outcome, OutcomePredicate, ResilienceContext};

use super::controller::{ExecutionInfo, HedgingController, HedgingExecutionContext};
use super::handler::{
    DelayArguments, DelayGenerator, HedgePredicate, HedgedActionGenerator, HedgingHandler,
};
use crate::offload::OffloadManager;
use crate::options::HedgingOptions;

/// Hedging resilience strategy.
///
/// Calls the callback once, and again each time the hedging delay elapses
/// without an acceptable outcome, up to `max_attempts` concurrent attempts.
/// The first outcome not handled by the outcome predicate wins and the other
/// attempts are cancelled.
///
/// # Example
///
/// ```ignore
/// let strategy = HedgingStrategy::<String>::builder(
///     HedgingOptions::builder()
///         .try_max_attempts(3)?
///         .delay(Duration::from_millis(50))
///         .build(),
/// )
/// .build();
///
/// let mut context = ResilienceContext::new();
/// let outcome = strategy
///     .execute(|ctx, id: u64| fetch(id, ctx), &mut context, 42)
///     .await;
/// ```
pub struct HedgingStrategy<T> {
    options: HedgingOptions,
    handler: Arc<HedgingHandler<T>>,
    controller: HedgingController<T>,
    offload: OffloadManager,
}

impl<T> HedgingStrategy<T>
where
    T: Send + Sync + 'static,
{
    /// Strategy with the default outcome predicate and hedge predicate.
    pub fn new(options: HedgingOptions) -> Self {
        Self::builder(options).build()
    }

    /// Builder starting from `options`.
    pub fn builder(options: HedgingOptions) -> HedgingStrategyBuilder<T> {
        HedgingStrategyBuilder::new(options)
    }

    /// Executes `callback` with hedging and returns the accepted outcome.
    ///
    /// On return `context` has its original cancellation token and property
    /// bag back, with the winning attempt's properties copied in and, if a
    /// secondary attempt won, its events replayed.
    ///
    /// Dropping the returned future before it resolves restores `context`
    /// without merging anything, and cancels the attempts still running.
    #[tracing::instrument(
        name = "hedging.execute",
        skip_all,
        fields(strategy = self.options.name.as_deref().unwrap_or_default())
    )]
    pub async fn execute<F, Fut, S>(
        &self,
        callback: F,
        context: &mut ResilienceContext,
        state: S,
    ) -> Outcome<T>
    where
        F: Fn(ResilienceContext, S) -> Fut + Send + Sync,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
        S: Clone + Send + Sync + 'static,
    {
        let hedging = self.controller.get_context(context);
        let mut guard = ExecutionGuard {
            hedging: Some(hedging),
            context,
        };
        let outcome = {
            let (hedging, context) = guard.parts();
            self.execute_core(hedging, &callback, context, &state).await
        };
        guard.complete();
        outcome
    }

    async fn execute_core<F, Fut, S>(
        &self,
        hedging: &mut HedgingExecutionContext<T>,
        callback: &F,
        context: &ResilienceContext,
        state: &S,
    ) -> Outcome<T>
    where
        F: Fn(ResilienceContext, S) -> Fut + Send + Sync,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
        S: Clone + Send + Sync + 'static,
    {
        loop {
            if context.is_cancelled() {
                if hedging.loaded_tasks() == 0 {
                    return Outcome::from_error(ExecutionError::Cancelled);
                }
                // drain what is running, the earliest outcome decides
                hedging.close_budget();
            }

            if let ExecutionInfo::Finished(outcome) = hedging.load_execution(callback, state).await
            {
                return outcome;
            }

            let delay = self
                .handler
                .delay(DelayArguments {
                    attempt: hedging.loaded_tasks(),
                    context,
                })
                .await;

            let Some(execution) = hedging.try_wait_for_completed_execution(delay).await else {
                continue;
            };
            if !execution.is_handled() {
                execution.accept_outcome();
                if let Some(outcome) = execution.take_outcome() {
                    return outcome;
                }
            }
        }
    }
}

const GUARD_CONSUMED: &str = "hedged execution already completed";

/// Owns the rented context for the duration of one `execute` call.
///
/// Completes the race on the normal path and abandons it when dropped
/// part way, so the caller context is restored either way.
struct ExecutionGuard<'a, T>
where
    T: Send + Sync + 'static,
{
    hedging: Option<HedgingExecutionContext<T>>,
    context: &'a mut ResilienceContext,
}

impl<T> ExecutionGuard<'_, T>
where
    T: Send + Sync + 'static,
{
    fn parts(&mut self) -> (&mut HedgingExecutionContext<T>, &ResilienceContext) {
        (
            self.hedging.as_mut().expect(GUARD_CONSUMED),
            &*self.context,
        )
    }

    fn complete(mut self) {
        if let Some(hedging) = self.hedging.take() {
            hedging.complete(self.context);
        }
    }
}

impl<T> Drop for ExecutionGuard<'_, T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(hedging) = self.hedging.take() {
            hedging.abandon(self.context);
        }
    }
}

impl<T> HedgingStrategy<T> {
    /// Options the strategy was built with.
    pub fn options(&self) -> &HedgingOptions {
        &self.options
    }

    /// Pooled controller backing the strategy.
    pub fn controller(&self) -> &HedgingController<T> {
        &self.controller
    }

    /// Manager running the background cleanup of finished calls.
    pub fn offload(&self) -> &OffloadManager {
        &self.offload
    }

    /// Waits until the background cleanup of every finished call is done.
    pub async fn wait_for_cleanup(&self) {
        self.offload.wait_all().await;
    }
}

impl<T> fmt::Debug for HedgingStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HedgingStrategy")
            .field("options", &self.options)
            .field("controller", &self.controller)
            .finish()
    }
}

/// Builder for [`HedgingStrategy`].
pub struct HedgingStrategyBuilder<T> {
    options: HedgingOptions,
    should_handle: Option<Arc<dyn OutcomePredicate<T>>>,
    should_hedge: Option<Arc<dyn HedgePredicate>>,
    action_generator: Option<Arc<dyn HedgedActionGenerator<T>>>,
    delay_generator: Option<Arc<dyn DelayGenerator>>,
    offload: Option<OffloadManager>,
}

impl<T> HedgingStrategyBuilder<T>
where
    T: Send + Sync + 'static,
{
    fn new(options: HedgingOptions) -> Self {
        Self {
            options,
            should_handle: None,
            should_hedge: None,
            action_generator: None,
            delay_generator: None,
            offload: None,
        }
    }

    /// Predicate deciding which outcomes are handled, i.e. not acceptable.
    ///
    /// Defaults to handling every failure.
    pub fn should_handle<P>(mut self, predicate: P) -> Self
    where
        P: OutcomePredicate<T> + 'static,
    {
        self.should_handle = Some(Arc::new(predicate));
        self
    }

    /// Predicate deciding whether a secondary attempt may start.
    pub fn should_hedge<P>(mut self, predicate: P) -> Self
    where
        P: HedgePredicate + 'static,
    {
        self.should_hedge = Some(Arc::new(predicate));
        self
    }

    /// Action run by each secondary attempt.
    ///
    /// Defaults to calling the callback passed to `execute` again.
    pub fn action_generator<G>(mut self, generator: G) -> Self
    where
        G: HedgedActionGenerator<T> + 'static,
    {
        self.action_generator = Some(Arc::new(generator));
        self
    }

    /// Per-tick delay, overriding the delay in the options.
    pub fn delay_generator<G>(mut self, generator: G) -> Self
    where
        G: DelayGenerator + 'static,
    {
        self.delay_generator = Some(Arc::new(generator));
        self
    }

    /// Manager running the background cleanup. A default one is created otherwise.
    pub fn offload(mut self, offload: OffloadManager) -> Self {
        self.offload = Some(offload);
        self
    }

    /// Build the strategy.
    pub fn build(self) -> HedgingStrategy<T> {
        let mut handler = HedgingHandler::new(self.options.delay);
        if let Some(predicate) = self.should_handle {
            handler = handler.with_should_handle(predicate);
        }
        if let Some(predicate) = self.should_hedge {
            handler = handler.with_should_hedge(predicate);
        }
        if let Some(generator) = self.action_generator {
            handler = handler.with_action_generator(generator);
        }
        if let Some(generator) = self.delay_generator {
            handler = handler.with_delay(generator);
        }
        let handler = Arc::new(handler);
        let offload = self.offload.unwrap_or_default();
        let controller = HedgingController::new(
            Arc::clone(&handler),
            self.options.max_attempts,
            offload.clone(),
        );

        HedgingStrategy {
            options: self.options,
            handler,
            controller,
            offload,
        }
    }
}
