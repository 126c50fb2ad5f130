//! Scripted callbacks shared by the integration tests.
#![allow(dead_code)]

pub mod tracing;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use hedgerow::{ExecutionError, Outcome, ResilienceContext, ResilienceEvent, ResiliencePropertyKey};
use hedgerow_core::CancellationToken;
use parking_lot::Mutex;
use thiserror::Error;

/// Property written by every attempt that runs to completion.
pub const SERVED_BY: ResiliencePropertyKey<usize> = ResiliencePropertyKey::new_static("served_by");

/// Failure returned by scripted attempts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("attempt {attempt} failed")]
pub struct AttemptFailed {
    pub attempt: usize,
}

/// How a scripted attempt ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Succeed,
    Fail,
    /// Panics while the callback builds the attempt future.
    PanicOnCall,
    /// Panics inside the attempt future once its latency elapsed.
    PanicOnPoll,
}

/// Behaviour of one scripted attempt.
#[derive(Debug, Clone)]
pub struct Step {
    pub latency: Duration,
    pub ending: Ending,
}

impl Step {
    fn new(latency_ms: u64, ending: Ending) -> Self {
        Self {
            latency: Duration::from_millis(latency_ms),
            ending,
        }
    }

    pub fn ok(latency_ms: u64) -> Self {
        Self::new(latency_ms, Ending::Succeed)
    }

    pub fn fail(latency_ms: u64) -> Self {
        Self::new(latency_ms, Ending::Fail)
    }

    pub fn panic() -> Self {
        Self::new(0, Ending::PanicOnCall)
    }

    pub fn panic_after(latency_ms: u64) -> Self {
        Self::new(latency_ms, Ending::PanicOnPoll)
    }
}

/// What a scripted attempt observed when it started.
#[derive(Debug, Clone)]
pub struct Started {
    pub attempt: usize,
    pub properties_on_start: usize,
    pub cancellation: CancellationToken,
}

/// Callback whose attempts follow a fixed script, indexed by call order.
///
/// A successful attempt returns its own index, stores it under [`SERVED_BY`]
/// and records an `attempt.<index>` event. Calls beyond the script repeat
/// the last step.
#[derive(Clone)]
pub struct Script {
    steps: Arc<Vec<Step>>,
    calls: Arc<AtomicUsize>,
    started: Arc<Mutex<Vec<Started>>>,
}

impl Script {
    pub fn new(steps: Vec<Step>) -> Self {
        assert!(!steps.is_empty());
        Self {
            steps: Arc::new(steps),
            calls: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times the callback was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> Vec<Started> {
        self.started.lock().clone()
    }

    pub fn callback(
        &self,
    ) -> impl Fn(ResilienceContext, ()) -> BoxFuture<'static, Outcome<usize>> + Send + Sync + 'static
    {
        let script = self.clone();
        move |context, ()| {
            let attempt = script.calls.fetch_add(1, Ordering::SeqCst);
            let step = script
                .steps
                .get(attempt)
                .or_else(|| script.steps.last())
                .cloned()
                .unwrap();
            if step.ending == Ending::PanicOnCall {
                panic!("scripted panic in attempt {attempt}");
            }
            script.started.lock().push(Started {
                attempt,
                properties_on_start: context.properties().len(),
                cancellation: context.cancellation_token().clone(),
            });

            async move {
                tokio::time::sleep(step.latency).await;
                match step.ending {
                    Ending::PanicOnPoll => panic!("scripted panic in attempt {attempt}"),
                    Ending::Fail => return Outcome::from_error(AttemptFailed { attempt }),
                    Ending::Succeed | Ending::PanicOnCall => {}
                }
                context.properties().set(&SERVED_BY, attempt);
                context.add_event(ResilienceEvent::new(format!("attempt.{attempt}")));
                Outcome::from_result(attempt)
            }
            .boxed()
        }
    }
}

/// Returns `true` if `outcome` is a captured panic.
pub fn is_panicked<T>(outcome: &Outcome<T>) -> bool {
    matches!(
        outcome
            .error()
            .and_then(|error| error.downcast_ref::<ExecutionError>()),
        Some(ExecutionError::Panicked(_))
    )
}

/// Names of the events recorded on `context`, in order.
pub fn event_names(context: &ResilienceContext) -> Vec<String> {
    context
        .events()
        .iter()
        .map(|event| event.name().to_string())
        .collect()
}
