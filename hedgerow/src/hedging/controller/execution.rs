//! Execution state of a single hedged attempt.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use hedgerow_core::{
    CancellationToken, ExecutionError, Outcome, ResilienceContext, ResilienceEvent,
    ResilienceProperties,
};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

use super::pool::Resettable;
use super::snapshot::ContextSnapshot;
use crate::hedging::handler::{
    HedgeArguments, HedgedAction, HedgedActionArguments, HedgingHandler,
};

/// Event recorded on a secondary attempt's context when it is launched.
pub const ON_HEDGING_EVENT: &str = "OnHedging";

/// Kind of a hedged attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HedgedTaskType {
    /// The first attempt, index 0.
    #[default]
    Primary,
    /// Any attempt launched after the primary.
    Secondary,
}

impl HedgedTaskType {
    /// Returns the kind as a string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

/// Completion cell shared between an attempt task and its slot.
struct Completion<T> {
    completed: AtomicBool,
    result: Mutex<Option<(Outcome<T>, bool)>>,
    notify: Notify,
}

impl<T> Completion<T> {
    fn new() -> Self {
        Self {
            completed: AtomicBool::new(false),
            result: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Stores the outcome. Only the first call has an effect.
    fn complete(&self, outcome: Outcome<T>, handled: bool) {
        let mut result = self.result.lock();
        if self.completed.load(Ordering::Acquire) {
            return;
        }
        *result = Some((outcome, handled));
        self.completed.store(true, Ordering::Release);
        drop(result);
        self.notify.notify_waiters();
    }

    fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_completed() {
                return;
            }
            notified.await;
        }
    }

    fn take(&self) -> Option<(Outcome<T>, bool)> {
        self.result.lock().take()
    }
}

/// Marks the attempt completed even if its task is dropped early.
struct CompletionGuard<T> {
    completion: Arc<Completion<T>>,
}

impl<T> CompletionGuard<T> {
    fn complete(self, outcome: Outcome<T>, handled: bool) {
        self.completion.complete(outcome, handled);
    }
}

impl<T> Drop for CompletionGuard<T> {
    fn drop(&mut self) {
        if !self.completion.is_completed() {
            self.completion
                .complete(Outcome::from_error(ExecutionError::Abandoned), true);
        }
    }
}

/// One primary or secondary attempt of a hedged execution.
///
/// Slots are pooled. A slot is `Idle` while pooled, gets started by
/// `initialize`, completes when its task stores an outcome, and is cleared by
/// `reset` before it goes back to the pool.
pub struct TaskExecution<T> {
    handler: Arc<HedgingHandler<T>>,
    kind: HedgedTaskType,
    attempt: usize,
    cancellation: Option<CancellationToken>,
    handle: Option<JoinHandle<()>>,
    completion: Option<Arc<Completion<T>>>,
    outcome: Option<Outcome<T>>,
    handled: bool,
    accepted: bool,
    properties: ResilienceProperties,
    context: Option<ResilienceContext>,
    started_at: Option<Instant>,
}

impl<T> TaskExecution<T>
where
    T: Send + Sync + 'static,
{
    pub(crate) fn new(handler: Arc<HedgingHandler<T>>) -> Self {
        Self {
            handler,
            kind: HedgedTaskType::Primary,
            attempt: 0,
            cancellation: None,
            handle: None,
            completion: None,
            outcome: None,
            handled: false,
            accepted: false,
            properties: ResilienceProperties::new(),
            context: None,
            started_at: None,
        }
    }

    /// Starts the attempt.
    ///
    /// Returns `false` without starting anything when the hedge predicate or
    /// the action generator rejects a secondary attempt; the slot is left
    /// idle.
    pub(crate) async fn initialize<F, Fut, S>(
        &mut self,
        kind: HedgedTaskType,
        snapshot: &ContextSnapshot,
        callback: &F,
        state: &S,
        attempt: usize,
    ) -> bool
    where
        F: Fn(ResilienceContext, S) -> Fut + Send + Sync,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
        S: Clone + Send + Sync + 'static,
    {
        self.kind = kind;
        self.attempt = attempt;
        self.properties.replace(snapshot.original_properties());

        let cancellation = snapshot.original_cancellation_token().child_token();
        let context = match kind {
            // the primary reports into the caller's own event stream
            HedgedTaskType::Primary => snapshot
                .context()
                .derive_shared(cancellation.clone(), self.properties.clone()),
            HedgedTaskType::Secondary => snapshot
                .context()
                .derive_isolated(cancellation.clone(), self.properties.clone()),
        };
        self.cancellation = Some(cancellation.clone());
        self.context = Some(context.clone());

        let action = if kind == HedgedTaskType::Secondary {
            let args = HedgeArguments {
                attempt,
                context: snapshot.context(),
            };
            match AssertUnwindSafe(self.handler.should_hedge(args))
                .catch_unwind()
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(attempt, "Hedged attempt rejected by hedge predicate");
                    self.clear();
                    return false;
                }
                Err(panic) => {
                    warn!(attempt, "Hedge predicate panicked");
                    self.spawn_failed(panic, cancellation, context);
                    return true;
                }
            }

            let args = HedgedActionArguments {
                attempt,
                primary_context: snapshot.context(),
                action_context: &context,
            };
            match std::panic::catch_unwind(AssertUnwindSafe(|| self.handler.generate_action(args)))
            {
                Ok(Some(action)) => action,
                Ok(None) => {
                    debug!(attempt, "Hedged attempt rejected by action generator");
                    self.clear();
                    return false;
                }
                Err(panic) => {
                    warn!(attempt, "Action generator panicked");
                    self.spawn_failed(panic, cancellation, context);
                    return true;
                }
            }
        } else {
            HedgedAction::Callback
        };

        if kind == HedgedTaskType::Secondary {
            context.add_event(ResilienceEvent::new(ON_HEDGING_EVENT));
            debug!(attempt, "Launching hedged attempt");
        }

        let future = match action {
            HedgedAction::Callback => {
                let attempt_context = context.clone();
                let state = state.clone();
                match std::panic::catch_unwind(AssertUnwindSafe(|| {
                    callback(attempt_context, state)
                })) {
                    Ok(future) => future.boxed(),
                    Err(panic) => {
                        warn!(attempt, "Callback panicked while creating the attempt");
                        self.spawn_failed(panic, cancellation, context);
                        return true;
                    }
                }
            }
            HedgedAction::Future(future) => future,
        };
        self.spawn(future, cancellation, context);
        true
    }

    /// Starts the slot with an already failed outcome.
    fn spawn_failed(
        &mut self,
        panic: Box<dyn Any + Send>,
        cancellation: CancellationToken,
        context: ResilienceContext,
    ) {
        let outcome = Outcome::from_error(ExecutionError::from_panic(panic));
        self.spawn(futures::future::ready(outcome).boxed(), cancellation, context);
    }

    fn spawn(
        &mut self,
        future: BoxFuture<'static, Outcome<T>>,
        cancellation: CancellationToken,
        context: ResilienceContext,
    ) {
        let completion = Arc::new(Completion::new());
        let guard = CompletionGuard {
            completion: Arc::clone(&completion),
        };
        let handler = Arc::clone(&self.handler);
        let span = info_span!(
            "hedging.attempt",
            kind = self.kind.as_str(),
            attempt = self.attempt,
        );

        let handle = tokio::spawn(
            async move {
                let outcome = tokio::select! {
                    biased;
                    outcome = AssertUnwindSafe(future).catch_unwind() => {
                        outcome.unwrap_or_else(|panic| {
                            warn!("Attempt panicked");
                            Outcome::from_error(ExecutionError::from_panic(panic))
                        })
                    }
                    () = cancellation.cancelled() => Outcome::from_error(ExecutionError::Cancelled),
                };

                let verdict = AssertUnwindSafe(handler.should_handle(&outcome, &context))
                    .catch_unwind()
                    .await;
                match verdict {
                    Ok(handled) => guard.complete(outcome, handled),
                    Err(panic) => {
                        warn!("Outcome predicate panicked, treating the attempt as failed");
                        guard.complete(
                            Outcome::from_error(ExecutionError::from_panic(panic)),
                            true,
                        );
                    }
                }
            }
            .instrument(span),
        );

        self.completion = Some(completion);
        self.handle = Some(handle);
        self.started_at = Some(Instant::now());
    }
}

impl<T> TaskExecution<T> {
    /// Kind of the attempt.
    pub fn kind(&self) -> HedgedTaskType {
        self.kind
    }

    /// Zero-based attempt index in spawn order.
    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Returns `true` once the attempt stored its outcome.
    pub fn is_completed(&self) -> bool {
        self.completion
            .as_ref()
            .is_some_and(|completion| completion.is_completed())
    }

    /// Captured outcome, available once the controller observed completion.
    pub fn outcome(&self) -> Option<&Outcome<T>> {
        self.outcome.as_ref()
    }

    /// Returns `true` if the outcome predicate handled the outcome.
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Returns `true` if this attempt won the race.
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    /// Isolated property bag used by the attempt.
    pub fn properties(&self) -> &ResilienceProperties {
        &self.properties
    }

    /// Context the attempt runs with.
    pub fn context(&self) -> Option<&ResilienceContext> {
        self.context.as_ref()
    }

    /// Flags this attempt as the winner.
    pub fn accept_outcome(&mut self) {
        self.accepted = true;
    }

    /// Moves the captured outcome out of the slot.
    pub fn take_outcome(&mut self) -> Option<Outcome<T>> {
        self.capture_outcome();
        self.outcome.take()
    }

    /// Signals the attempt's cancellation scope without waiting.
    pub fn cancel(&self) {
        if let Some(cancellation) = &self.cancellation {
            cancellation.cancel();
        }
    }

    /// Moves the outcome stored by the attempt task into the slot.
    pub(crate) fn capture_outcome(&mut self) {
        if self.outcome.is_some() {
            return;
        }
        let Some((outcome, handled)) = self.completion.as_ref().and_then(|c| c.take()) else {
            return;
        };
        debug!(
            kind = self.kind.as_str(),
            attempt = self.attempt,
            success = outcome.has_result(),
            handled,
            elapsed_ms = self
                .started_at
                .map(|started| u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
                .unwrap_or_default(),
            "Attempt completed"
        );
        self.outcome = Some(outcome);
        self.handled = handled;
    }

    /// Future resolving once the attempt completes.
    pub(crate) fn completion_future(&self) -> Option<BoxFuture<'static, ()>>
    where
        T: Send + 'static,
    {
        let completion = Arc::clone(self.completion.as_ref()?);
        Some(async move { completion.wait().await }.boxed())
    }

    /// Waits for the attempt task to finish, then clears the slot.
    pub(crate) async fn reset(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(error) = handle.await
        {
            warn!(attempt = self.attempt, %error, "Attempt task ended abnormally");
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.kind = HedgedTaskType::Primary;
        self.attempt = 0;
        self.cancellation = None;
        self.completion = None;
        self.outcome = None;
        self.handled = false;
        self.accepted = false;
        self.properties.clear();
        self.context = None;
        self.started_at = None;
    }
}

impl<T> Resettable for TaskExecution<T> {
    fn try_reset(&mut self) -> bool {
        if self.handle.as_ref().is_some_and(|handle| !handle.is_finished()) {
            self.cancel();
            return false;
        }
        self.handle = None;
        self.clear();
        true
    }
}

impl<T> fmt::Debug for TaskExecution<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecution")
            .field("kind", &self.kind)
            .field("attempt", &self.attempt)
            .field("completed", &self.is_completed())
            .field("handled", &self.handled)
            .field("accepted", &self.accepted)
            .finish()
    }
}
