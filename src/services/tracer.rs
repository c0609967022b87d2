//! Tracer capability, span handles and the no-op implementation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use http::HeaderMap;
use serde_json::Value;

use crate::error::ObservabilityError;

/// Span tag names shared by every tracer implementation.
pub mod tags {
    pub const COMPONENT: &str = "component";
    pub const SPAN_KIND: &str = "span.kind";
    pub const SPAN_KIND_RPC_SERVER: &str = "server";
    pub const HTTP_METHOD: &str = "http.method";
    pub const HTTP_URL: &str = "http.url";
    pub const HTTP_STATUS_CODE: &str = "http.status_code";
}

/// Tag set attached to a span.
pub type Tags = BTreeMap<String, Value>;

/// Identity of a span propagated between processes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpanContext {
    /// 32 lowercase hex digits.
    pub trace_id: String,
    /// 16 lowercase hex digits.
    pub span_id: String,
    pub sampled: bool,
}

/// How to start a span.
#[derive(Clone, Debug)]
pub struct SpanOptions {
    pub child_of: Option<SpanContext>,
    pub start_time: SystemTime,
    pub tags: Tags,
}

impl Default for SpanOptions {
    fn default() -> Self {
        Self { child_of: None, start_time: SystemTime::now(), tags: Tags::new() }
    }
}

/// A started span. Shared between the handler and the response finalizer,
/// so every method takes `&self`.
pub trait Span: Send + Sync {
    fn add_tags(&self, tags: Tags);

    /// Ends the span. Calls after the first are ignored.
    fn finish(&self);

    fn context(&self) -> Option<SpanContext> {
        None
    }
}

/// Starts spans and reads upstream trace context from HTTP headers.
pub trait Tracer: Send + Sync {
    /// Returns the parent context carried by `carrier`, if any.
    fn extract(&self, carrier: &HeaderMap) -> Result<Option<SpanContext>, ObservabilityError>;

    fn start_span(&self, name: &str, options: SpanOptions) -> Result<Arc<dyn Span>, ObservabilityError>;
}

/// Never finds a parent, hands out spans that record nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopTracer;

/// Span returned by [`NoopTracer`].
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSpan;

impl Span for NoopSpan {
    fn add_tags(&self, _tags: Tags) {}
    fn finish(&self) {}
}

impl Tracer for NoopTracer {
    fn extract(&self, _carrier: &HeaderMap) -> Result<Option<SpanContext>, ObservabilityError> {
        Ok(None)
    }

    fn start_span(&self, _name: &str, _options: SpanOptions) -> Result<Arc<dyn Span>, ObservabilityError> {
        Ok(Arc::new(NoopSpan))
    }
}
