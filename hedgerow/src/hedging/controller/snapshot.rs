use hedgerow_core::{CancellationToken, ResilienceContext, ResilienceProperties};

/// Caller state captured once, before a hedged execution starts racing.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    context: ResilienceContext,
}

impl ContextSnapshot {
    /// Captures the caller context as it is now.
    pub fn capture(context: &ResilienceContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// The caller context as it was when captured.
    pub fn context(&self) -> &ResilienceContext {
        &self.context
    }

    /// The caller's own cancellation token.
    pub fn original_cancellation_token(&self) -> &CancellationToken {
        self.context.cancellation_token()
    }

    /// The caller's own property bag.
    pub fn original_properties(&self) -> &ResilienceProperties {
        self.context.properties()
    }

    /// The caller's continuation-context flag.
    pub fn continue_on_captured_context(&self) -> bool {
        self.context.continues_on_captured_context()
    }

    /// Puts the captured cancellation token and property bag back on `context`.
    pub fn restore(&self, context: &mut ResilienceContext) {
        context.set_cancellation_token(self.original_cancellation_token().clone());
        context.set_properties(self.original_properties().clone());
    }
}
