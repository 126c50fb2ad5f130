//! Per-call state of a hedged execution.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::select_all;
use hedgerow_core::{Outcome, ResilienceContext, ResilienceProperties};
use tracing::{debug, trace, warn};

use super::execution::{HedgedTaskType, TaskExecution};
use super::pool::{ObjectPool, Resettable};
use super::snapshot::ContextSnapshot;
use crate::offload::OffloadManager;
use crate::options::HedgingDelay;

#[cfg(feature = "metrics")]
use crate::metrics::{HEDGING_ACCEPTED, HEDGING_ATTEMPTS, HEDGING_CLEANUP_DURATION};

/// Offload kind of the background slot cleanup.
pub const CLEANUP_TASK_KIND: &str = "hedging_cleanup";

const NOT_INITIALIZED_ERROR: &str = "HedgingExecutionContext used before initialize";

/// Result of [`HedgingExecutionContext::load_execution`].
pub enum ExecutionInfo<'a, T> {
    /// A new attempt was started.
    Loaded(&'a TaskExecution<T>),
    /// No attempt was started and the race is still undecided.
    NotLoaded,
    /// The budget is spent with nothing running. This is the final outcome.
    Finished(Outcome<T>),
}

impl<T> fmt::Debug for ExecutionInfo<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded(execution) => f.debug_tuple("Loaded").field(execution).finish(),
            Self::NotLoaded => f.write_str("NotLoaded"),
            Self::Finished(_) => f.write_str("Finished"),
        }
    }
}

/// Controller of one hedged call.
///
/// Loads attempts up to the budget, waits for the first completed one with
/// the current delay, and on [`complete`](Self::complete) reconciles the
/// winner's state into the caller context before handing the losers to a
/// background cleanup. Instances are pooled and returned to their pool once
/// that cleanup finishes.
///
/// A context dropped while still rented cancels its running attempts and
/// releases their slots on the spot.
pub struct HedgingExecutionContext<T> {
    tasks: Vec<TaskExecution<T>>,
    // Indices into `tasks` of attempts not yet observed as completed.
    executing: Vec<usize>,
    execution_pool: Arc<ObjectPool<TaskExecution<T>>>,
    offload: OffloadManager,
    max_attempts: usize,
    next_attempt: usize,
    budget_closed: bool,
    home: Weak<ObjectPool<HedgingExecutionContext<T>>>,
    replaced_properties: ResilienceProperties,
    snapshot: Option<ContextSnapshot>,
}

impl<T> HedgingExecutionContext<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(
        execution_pool: Arc<ObjectPool<TaskExecution<T>>>,
        offload: OffloadManager,
        max_attempts: usize,
        home: Weak<ObjectPool<HedgingExecutionContext<T>>>,
    ) -> Self {
        Self {
            tasks: Vec::with_capacity(max_attempts),
            executing: Vec::with_capacity(max_attempts),
            execution_pool,
            offload,
            max_attempts,
            next_attempt: 0,
            budget_closed: false,
            home,
            replaced_properties: ResilienceProperties::new(),
            snapshot: None,
        }
    }

    /// Captures the caller context and swaps in a replacement property bag.
    ///
    /// The replacement starts as a copy of the caller's bag. The caller's own
    /// bag is left untouched until [`complete`](Self::complete).
    pub fn initialize(&mut self, context: &mut ResilienceContext) {
        let snapshot = ContextSnapshot::capture(context);
        self.replaced_properties
            .replace(snapshot.original_properties());
        context.set_properties(self.replaced_properties.clone());
        self.snapshot = Some(snapshot);
    }

    /// Starts the next attempt if the budget allows it.
    pub async fn load_execution<F, Fut, S>(
        &mut self,
        callback: &F,
        state: &S,
    ) -> ExecutionInfo<'_, T>
    where
        F: Fn(ResilienceContext, S) -> Fut + Send + Sync,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
        S: Clone + Send + Sync + 'static,
    {
        if self.is_budget_exhausted() {
            return self.execution_info_when_no_execution();
        }

        let attempt = self.next_attempt;
        // a rejected attempt still consumes its index
        self.next_attempt += 1;
        let kind = if attempt == 0 {
            HedgedTaskType::Primary
        } else {
            HedgedTaskType::Secondary
        };
        let snapshot = self.snapshot.clone().expect(NOT_INITIALIZED_ERROR);

        let mut execution = self.execution_pool.get();
        if !execution
            .initialize(kind, &snapshot, callback, state, attempt)
            .await
        {
            self.execution_pool.release(execution);
            return self.execution_info_when_no_execution();
        }

        #[cfg(feature = "metrics")]
        metrics::counter!(*HEDGING_ATTEMPTS, "kind" => kind.as_str()).increment(1);

        let index = self.tasks.len();
        self.tasks.push(execution);
        self.executing.push(index);
        ExecutionInfo::Loaded(&self.tasks[index])
    }

    /// Waits for a completed attempt, bounded by `delay`.
    ///
    /// Returns `None` when the caller should try to load another attempt.
    /// The returned attempt is no longer counted as executing.
    pub async fn try_wait_for_completed_execution(
        &mut self,
        delay: HedgingDelay,
    ) -> Option<&mut TaskExecution<T>> {
        let index = self.wait_for_completed_index(delay).await?;
        self.tasks.get_mut(index)
    }

    async fn wait_for_completed_index(&mut self, delay: HedgingDelay) -> Option<usize> {
        if let Some(index) = self.try_remove_executed_task() {
            trace!(attempt = self.tasks[index].attempt(), "Attempt already completed");
            return Some(index);
        }

        if self.is_budget_exhausted() {
            self.wait_for_any_completion().await;
            return self.try_remove_executed_task();
        }

        let delay = match delay {
            HedgingDelay::Fixed(delay) if delay.is_zero() => return None,
            _ if self.tasks.is_empty() => return None,
            HedgingDelay::Infinite => {
                self.wait_for_any_completion().await;
                return self.try_remove_executed_task();
            }
            HedgingDelay::Fixed(delay) => delay,
        };

        let completion = self.wait_for_any_completion();
        let cancellation = self
            .snapshot
            .as_ref()
            .expect(NOT_INITIALIZED_ERROR)
            .original_cancellation_token()
            .clone();
        let completed = tokio::select! {
            () = completion => true,
            () = tokio::time::sleep(delay) => false,
            () = cancellation.cancelled() => false,
        };

        if completed {
            self.try_remove_executed_task()
        } else {
            None
        }
    }

    /// Future resolving once any executing attempt completes.
    fn wait_for_any_completion(&self) -> impl Future<Output = ()> + Send + 'static {
        let waits: Vec<_> = self
            .executing
            .iter()
            .filter_map(|&index| self.tasks[index].completion_future())
            .collect();
        async move {
            if !waits.is_empty() {
                select_all(waits).await;
            }
        }
    }

    fn try_remove_executed_task(&mut self) -> Option<usize> {
        let position = self
            .executing
            .iter()
            .position(|&index| self.tasks[index].is_completed())?;
        let index = self.executing.remove(position);
        self.tasks[index].capture_outcome();
        Some(index)
    }

    fn execution_info_when_no_execution(&mut self) -> ExecutionInfo<'_, T> {
        if !self.executing.is_empty() {
            return ExecutionInfo::NotLoaded;
        }
        // nothing left running: the earliest completed attempt decides
        let Some(execution) = self.tasks.iter_mut().find(|task| task.is_completed()) else {
            return ExecutionInfo::NotLoaded;
        };
        execution.accept_outcome();
        match execution.take_outcome() {
            Some(outcome) => ExecutionInfo::Finished(outcome),
            None => ExecutionInfo::NotLoaded,
        }
    }

    /// Ends the call: reconciles the caller context and schedules cleanup.
    ///
    /// The caller's cancellation token and property bag are restored. When
    /// attempts were loaded, exactly one must have been accepted. Its
    /// properties are copied into the caller's bag and, for a secondary
    /// attempt, its events are replayed on the caller context. Attempts still
    /// running are cancelled and awaited in the background.
    ///
    /// # Panics
    ///
    /// Panics if attempts were loaded and the number of accepted ones is not
    /// exactly one.
    pub fn complete(self, context: &mut ResilienceContext) {
        self.update_original_context(context);
        self.schedule_cleanup();
    }

    /// Ends the call without a winner.
    ///
    /// For drivers that stop before accepting an outcome, e.g. because their
    /// future was dropped. The caller's cancellation token and property bag
    /// are restored untouched by any attempt, running attempts are cancelled
    /// and their slots cleaned up in the background.
    pub fn abandon(self, context: &mut ResilienceContext) {
        if let Some(snapshot) = self.snapshot.as_ref() {
            snapshot.restore(context);
        }
        debug!(
            loaded = self.tasks.len(),
            executing = self.executing.len(),
            "Hedged execution abandoned"
        );
        self.schedule_cleanup();
    }

    fn schedule_cleanup(self) {
        for &index in &self.executing {
            self.tasks[index].cancel();
        }
        if tokio::runtime::Handle::try_current().is_err() {
            // dropping releases the slots without awaiting them
            warn!("No runtime for hedging cleanup, releasing attempts in place");
            return;
        }
        let offload = self.offload.clone();
        offload.spawn(CLEANUP_TASK_KIND, self.cleanup_in_background());
    }

    fn update_original_context(&self, context: &mut ResilienceContext) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return;
        };
        snapshot.restore(context);

        if self.tasks.is_empty() {
            return;
        }

        let accepted = self.tasks.iter().filter(|task| task.is_accepted()).count();
        assert_eq!(
            accepted, 1,
            "There must be exactly one accepted outcome for hedging. Found {accepted}."
        );
        let Some(winner) = self.tasks.iter().find(|task| task.is_accepted()) else {
            return;
        };

        #[cfg(feature = "metrics")]
        metrics::counter!(*HEDGING_ACCEPTED, "kind" => winner.kind().as_str()).increment(1);

        context.properties().replace(winner.properties());
        if winner.kind() == HedgedTaskType::Secondary
            && let Some(attempt_context) = winner.context()
        {
            for event in attempt_context.events() {
                context.add_event(event);
            }
        }
        debug!(
            attempt = winner.attempt(),
            kind = winner.kind().as_str(),
            loaded = self.tasks.len(),
            "Hedged execution completed"
        );
    }

    async fn cleanup_in_background(mut self) {
        #[cfg(feature = "metrics")]
        let start = tokio::time::Instant::now();

        let pool = Arc::clone(&self.execution_pool);
        self.executing.clear();
        // slots stay owned by the context until reset, so a dropped cleanup
        // still releases them
        while let Some(task) = self.tasks.last_mut() {
            task.reset().await;
            if let Some(task) = self.tasks.pop() {
                pool.release(task);
            }
        }

        #[cfg(feature = "metrics")]
        metrics::histogram!(*HEDGING_CLEANUP_DURATION).record(start.elapsed().as_secs_f64());

        self.reset();
        if let Some(home) = self.home.upgrade() {
            home.release(self);
        }
    }
}

impl<T> HedgingExecutionContext<T> {
    /// Number of attempts started so far.
    pub fn loaded_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Attempts started so far, in load order.
    pub fn tasks(&self) -> &[TaskExecution<T>] {
        &self.tasks
    }

    /// Number of started attempts not yet observed as completed.
    pub fn executing_tasks(&self) -> usize {
        self.executing.len()
    }

    /// Returns `true` between `initialize` and the end of cleanup.
    pub fn is_initialized(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Caller state captured by `initialize`.
    pub fn snapshot(&self) -> Option<&ContextSnapshot> {
        self.snapshot.as_ref()
    }

    /// Stops any further attempt from being loaded.
    pub fn close_budget(&mut self) {
        self.budget_closed = true;
    }

    fn is_budget_exhausted(&self) -> bool {
        self.budget_closed || self.next_attempt >= self.max_attempts
    }

    fn reset(&mut self) {
        self.tasks.clear();
        self.executing.clear();
        self.next_attempt = 0;
        self.budget_closed = false;
        self.replaced_properties.clear();
        self.snapshot = None;
    }
}

impl<T> Resettable for HedgingExecutionContext<T> {
    fn try_reset(&mut self) -> bool {
        if !self.tasks.is_empty() {
            return false;
        }
        self.reset();
        true
    }
}

impl<T> Drop for HedgingExecutionContext<T> {
    fn drop(&mut self) {
        for &index in &self.executing {
            if let Some(task) = self.tasks.get(index) {
                task.cancel();
            }
        }
        // still rented: neither complete nor cleanup got to release it
        if self.snapshot.is_some() {
            for task in self.tasks.drain(..) {
                self.execution_pool.release(task);
            }
            if let Some(home) = self.home.upgrade() {
                home.forget_rented();
            }
        }
    }
}

impl<T> fmt::Debug for HedgingExecutionContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HedgingExecutionContext")
            .field("loaded", &self.tasks.len())
            .field("executing", &self.executing.len())
            .field("max_attempts", &self.max_attempts)
            .field("budget_closed", &self.budget_closed)
            .finish()
    }
}
