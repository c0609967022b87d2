//! [`Tracer`] backed by OpenTelemetry.
//!
//! Parent context is read with the W3C trace-context propagator
//! (`traceparent` / `tracestate` headers); spans go to whatever tracer
//! provider is installed globally, or to an explicit [`BoxedTracer`].
//!
//! ```rust,ignore
//! let services = Services::builder(config)
//!     .tracer(Arc::new(OtelTracer::new("widgets-api")))
//!     .build();
//! ```

use std::sync::Arc;

use http::HeaderMap;
use opentelemetry::global::{self, BoxedSpan, BoxedTracer};
use opentelemetry::propagation::{Extractor, TextMapPropagator};
use opentelemetry::trace::{
    Span as _, SpanContext as OtelSpanContext, SpanId, SpanKind, TraceContextExt, TraceFlags,
    TraceId, TraceState, Tracer as _,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use parking_lot::Mutex;
use serde_json::Value;

use super::tracer::{Span, SpanContext, SpanOptions, Tags, Tracer};
use crate::error::ObservabilityError;

/// OpenTelemetry-backed tracer.
pub struct OtelTracer {
    tracer: BoxedTracer,
    propagator: TraceContextPropagator,
}

impl OtelTracer {
    /// Uses the globally installed tracer provider.
    pub fn new(name: &'static str) -> Self {
        Self::with_tracer(global::tracer(name))
    }

    pub fn with_tracer(tracer: BoxedTracer) -> Self {
        Self { tracer, propagator: TraceContextPropagator::new() }
    }

    fn parent(&self, child_of: Option<&SpanContext>) -> Result<Context, ObservabilityError> {
        let Some(parent) = child_of else {
            return Ok(Context::new());
        };

        let trace_id = TraceId::from_hex(&parent.trace_id)
            .map_err(|e| ObservabilityError::Tracer(format!("bad trace id `{}`: {e}", parent.trace_id)))?;
        let span_id = SpanId::from_hex(&parent.span_id)
            .map_err(|e| ObservabilityError::Tracer(format!("bad span id `{}`: {e}", parent.span_id)))?;
        let flags = if parent.sampled { TraceFlags::SAMPLED } else { TraceFlags::default() };

        let remote = OtelSpanContext::new(trace_id, span_id, flags, true, TraceState::default());
        Ok(Context::new().with_remote_span_context(remote))
    }
}

impl Tracer for OtelTracer {
    fn extract(&self, carrier: &HeaderMap) -> Result<Option<SpanContext>, ObservabilityError> {
        let cx = self.propagator.extract(&HeaderExtractor(carrier));
        let span = cx.span();
        let sc = span.span_context();
        if !sc.is_valid() {
            return Ok(None);
        }
        Ok(Some(from_otel(sc)))
    }

    fn start_span(&self, name: &str, options: SpanOptions) -> Result<Arc<dyn Span>, ObservabilityError> {
        let parent = self.parent(options.child_of.as_ref())?;
        let span = self
            .tracer
            .span_builder(name.to_owned())
            .with_kind(SpanKind::Server)
            .with_start_time(options.start_time)
            .with_attributes(to_attributes(options.tags))
            .start_with_context(&self.tracer, &parent);

        Ok(Arc::new(OtelSpan { inner: Mutex::new(span), finished: Mutex::new(false) }))
    }
}

/// A live OpenTelemetry span.
pub struct OtelSpan {
    inner: Mutex<BoxedSpan>,
    finished: Mutex<bool>,
}

impl Span for OtelSpan {
    fn add_tags(&self, tags: Tags) {
        let mut span = self.inner.lock();
        for kv in to_attributes(tags) {
            span.set_attribute(kv);
        }
    }

    fn finish(&self) {
        let mut finished = self.finished.lock();
        if !*finished {
            self.inner.lock().end();
            *finished = true;
        }
    }

    fn context(&self) -> Option<SpanContext> {
        let span = self.inner.lock();
        let sc = span.span_context();
        sc.is_valid().then(|| from_otel(sc))
    }
}

fn from_otel(sc: &OtelSpanContext) -> SpanContext {
    SpanContext {
        trace_id: format!("{:032x}", sc.trace_id()),
        span_id: format!("{:016x}", sc.span_id()),
        sampled: sc.is_sampled(),
    }
}

fn to_attributes(tags: Tags) -> Vec<KeyValue> {
    tags.into_iter()
        .map(|(key, value)| match value {
            Value::Bool(b) => KeyValue::new(key, b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => KeyValue::new(key, i),
                None => KeyValue::new(key, n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => KeyValue::new(key, s),
            other => KeyValue::new(key, other.to_string()),
        })
        .collect()
}

/// Read-only view of `http::HeaderMap` for the propagator.
struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(http::HeaderName::as_str).collect()
    }
}
