//! Resilience context flowing through a strategy execution.
//!
//! The context carries the caller's cancellation signal, its property bag and
//! the stream of resilience events recorded while executing. Strategies that
//! run several attempts concurrently derive per-attempt contexts with
//! [`ResilienceContext::derive_shared`] and [`ResilienceContext::derive_isolated`].

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;

use crate::properties::ResilienceProperties;

/// Severity attached to a recorded [`ResilienceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResilienceEventSeverity {
    /// Diagnostic event.
    Debug,
    /// Regular event such as a hedge being launched.
    #[default]
    Information,
    /// Something went wrong but execution continued.
    Warning,
    /// Execution failed.
    Error,
}

impl ResilienceEventSeverity {
    /// Returns the severity as a string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Information => "information",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// An event reported by a resilience strategy during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResilienceEvent {
    name: SmolStr,
    severity: ResilienceEventSeverity,
}

impl ResilienceEvent {
    /// Creates an event with [`ResilienceEventSeverity::Information`] severity.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self::with_severity(name, ResilienceEventSeverity::default())
    }

    /// Creates an event with an explicit severity.
    pub fn with_severity(name: impl Into<SmolStr>, severity: ResilienceEventSeverity) -> Self {
        Self {
            name: name.into(),
            severity,
        }
    }

    /// Event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Event severity.
    pub fn severity(&self) -> ResilienceEventSeverity {
        self.severity
    }
}

/// Shared, ordered stream of recorded events.
///
/// Clones append to the same stream.
#[derive(Clone, Default)]
pub struct ResilienceEvents {
    inner: Arc<Mutex<Vec<ResilienceEvent>>>,
}

impl ResilienceEvents {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: ResilienceEvent) {
        self.inner.lock().push(event);
    }

    /// Returns the recorded events in chronological order.
    pub fn snapshot(&self) -> Vec<ResilienceEvent> {
        self.inner.lock().clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns `true` if both handles refer to the same stream.
    pub fn ptr_eq(&self, other: &ResilienceEvents) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ResilienceEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.lock().iter()).finish()
    }
}

/// Context for a single logical execution through a resilience strategy.
#[derive(Debug, Clone, Default)]
pub struct ResilienceContext {
    operation_key: Option<SmolStr>,
    cancellation_token: CancellationToken,
    properties: ResilienceProperties,
    events: ResilienceEvents,
    continue_on_captured_context: bool,
}

impl ResilienceContext {
    /// Creates a context with a fresh cancellation token and empty bags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context observing the given cancellation token.
    pub fn with_cancellation(cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            ..Self::default()
        }
    }

    /// Sets the operation key used to identify the execution in telemetry.
    pub fn operation_key(self, key: impl Into<SmolStr>) -> Self {
        Self {
            operation_key: Some(key.into()),
            ..self
        }
    }

    /// Sets the continuation-context flag.
    pub fn continue_on_captured_context(self, enabled: bool) -> Self {
        Self {
            continue_on_captured_context: enabled,
            ..self
        }
    }

    /// Returns the operation key, if any.
    pub fn key(&self) -> Option<&str> {
        self.operation_key.as_deref()
    }

    /// Returns the continuation-context flag.
    ///
    /// Carried on every derived context so nested strategies see the
    /// caller's preference.
    pub fn continues_on_captured_context(&self) -> bool {
        self.continue_on_captured_context
    }

    /// Cancellation token observed by the execution.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation_token
    }

    /// Shorthand for `cancellation_token().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Replaces the cancellation token.
    pub fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.cancellation_token = token;
    }

    /// Property bag attached to the context.
    pub fn properties(&self) -> &ResilienceProperties {
        &self.properties
    }

    /// Replaces the property bag handle.
    pub fn set_properties(&mut self, properties: ResilienceProperties) {
        self.properties = properties;
    }

    /// Records a resilience event.
    pub fn add_event(&self, event: ResilienceEvent) {
        self.events.push(event);
    }

    /// Returns the recorded events in chronological order.
    pub fn events(&self) -> Vec<ResilienceEvent> {
        self.events.snapshot()
    }

    /// Event stream handle.
    pub fn event_stream(&self) -> &ResilienceEvents {
        &self.events
    }

    /// Derives a context that records events into this context's stream.
    pub fn derive_shared(
        &self,
        cancellation_token: CancellationToken,
        properties: ResilienceProperties,
    ) -> Self {
        Self {
            operation_key: self.operation_key.clone(),
            cancellation_token,
            properties,
            events: self.events.clone(),
            continue_on_captured_context: self.continue_on_captured_context,
        }
    }

    /// Derives a context with its own, initially empty, event stream.
    pub fn derive_isolated(
        &self,
        cancellation_token: CancellationToken,
        properties: ResilienceProperties,
    ) -> Self {
        Self {
            events: ResilienceEvents::new(),
            ..self.derive_shared(cancellation_token, properties)
        }
    }
}
