//! Span capture for asserting on hedging spans.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Dispatch;
use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing_subscriber::Layer;
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

const SPAN_PREFIX: &str = "hedging.";

/// A captured `hedging.*` span.
#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedSpan {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

struct SpanCaptureLayer {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
}

#[derive(Default)]
struct FieldVisitor {
    fields: Vec<(String, String)>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .push((field.name().to_string(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_string(), value.to_string()));
    }
}

impl<S> Layer<S> for SpanCaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let metadata = attrs.metadata();
        if !metadata.name().starts_with(SPAN_PREFIX) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);

        let parent_id = attrs
            .parent()
            .cloned()
            .or_else(|| {
                attrs
                    .is_contextual()
                    .then(|| ctx.current_span().id().cloned())
                    .flatten()
            })
            .map(|id| id.into_u64());

        self.spans.lock().push(CapturedSpan {
            id: id.into_u64(),
            parent_id,
            name: metadata.name().to_string(),
            fields: visitor.fields,
        });
    }
}

/// Collects `hedging.*` spans created while its dispatch is the default.
#[derive(Clone)]
pub struct SpanCollector {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
    dispatch: Dispatch,
}

impl SpanCollector {
    pub fn new() -> Self {
        let spans = Arc::new(Mutex::new(Vec::new()));
        let layer = SpanCaptureLayer {
            spans: Arc::clone(&spans),
        };
        let dispatch = Dispatch::new(Registry::default().with(layer));
        Self { spans, dispatch }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.lock().clone()
    }

    pub fn spans_named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans
            .lock()
            .iter()
            .filter(|span| span.name == name)
            .cloned()
            .collect()
    }

    pub fn assert_has_spans(&self, expected: &[&str]) {
        let names: Vec<_> = self.spans().into_iter().map(|span| span.name).collect();
        for name in expected {
            assert!(
                names.iter().any(|captured| captured == name),
                "expected span '{name}' not found, captured: {names:?}"
            );
        }
    }
}
