#![allow(dead_code)]

use std::sync::Arc;
use std::time::SystemTime;

use heureux::ObservabilityError;
use heureux::services::{
    Level, Logger, MetricOptions, Metrics, Services, Span, SpanContext, SpanOptions, Tags, Tracer,
};
use http::HeaderMap;
use parking_lot::Mutex;
use serde_json::{Value, json};

#[derive(Clone, Debug)]
pub struct LogLine {
    pub level: Level,
    pub bindings: Value,
    pub data: Value,
    pub message: String,
}

/// Logger that keeps every record, with the bindings of the child it came from.
#[derive(Clone, Default)]
pub struct RecordingLogger {
    bindings: Value,
    pub lines: Arc<Mutex<Vec<LogLine>>>,
}

impl RecordingLogger {
    pub fn messages(&self) -> Vec<String> {
        self.lines.lock().iter().map(|l| l.message.clone()).collect()
    }

    pub fn find(&self, message: &str) -> Option<LogLine> {
        self.lines.lock().iter().find(|l| l.message == message).cloned()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: Level, data: Value, message: &str) {
        self.lines.lock().push(LogLine {
            level,
            bindings: self.bindings.clone(),
            data,
            message: message.to_owned(),
        });
    }

    fn child(&self, bindings: Value) -> Result<Arc<dyn Logger>, ObservabilityError> {
        Ok(Arc::new(Self { bindings, lines: Arc::clone(&self.lines) }))
    }
}

#[derive(Debug)]
pub struct SpanRecord {
    pub name: String,
    pub parent: Option<SpanContext>,
    pub start_time: SystemTime,
    pub tags: Tags,
    pub finished: u32,
}

struct RecordingSpan {
    index: usize,
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl Span for RecordingSpan {
    fn add_tags(&self, tags: Tags) {
        self.spans.lock()[self.index].tags.extend(tags);
    }

    fn finish(&self) {
        self.spans.lock()[self.index].finished += 1;
    }
}

/// Tracer that records started spans and reads the parent from `x-trace-id`.
#[derive(Clone, Default)]
pub struct RecordingTracer {
    pub spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl Tracer for RecordingTracer {
    fn extract(&self, carrier: &HeaderMap) -> Result<Option<SpanContext>, ObservabilityError> {
        Ok(carrier
            .get("x-trace-id")
            .and_then(|v| v.to_str().ok())
            .map(|trace_id| SpanContext {
                trace_id: trace_id.to_owned(),
                span_id: "00f067aa0ba902b7".to_owned(),
                sampled: true,
            }))
    }

    fn start_span(&self, name: &str, options: SpanOptions) -> Result<Arc<dyn Span>, ObservabilityError> {
        let mut spans = self.spans.lock();
        spans.push(SpanRecord {
            name: name.to_owned(),
            parent: options.child_of,
            start_time: options.start_time,
            tags: options.tags,
            finished: 0,
        });
        Ok(Arc::new(RecordingSpan { index: spans.len() - 1, spans: Arc::clone(&self.spans) }))
    }
}

/// Tracer whose collector is unreachable.
pub struct FailingTracer;

impl Tracer for FailingTracer {
    fn extract(&self, _carrier: &HeaderMap) -> Result<Option<SpanContext>, ObservabilityError> {
        Ok(None)
    }

    fn start_span(&self, _name: &str, _options: SpanOptions) -> Result<Arc<dyn Span>, ObservabilityError> {
        Err(ObservabilityError::Tracer("collector unreachable".into()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    pub kind: &'static str,
    pub stat: String,
    pub value: f64,
    pub tags: Vec<(String, String)>,
}

#[derive(Clone, Default)]
pub struct RecordingMetrics {
    pub records: Arc<Mutex<Vec<MetricRecord>>>,
}

impl RecordingMetrics {
    fn record(&self, kind: &'static str, stats: &[&str], value: f64, options: &MetricOptions) {
        let mut records = self.records.lock();
        for stat in stats {
            records.push(MetricRecord {
                kind,
                stat: (*stat).to_owned(),
                value,
                tags: options.tags.clone(),
            });
        }
    }
}

impl Metrics for RecordingMetrics {
    fn increment(&self, stats: &[&str], value: f64, options: &MetricOptions) {
        self.record("increment", stats, value, options);
    }

    fn histogram(&self, stats: &[&str], value: f64, options: &MetricOptions) {
        self.record("histogram", stats, value, options);
    }

    fn gauge(&self, stats: &[&str], value: f64, options: &MetricOptions) {
        self.record("gauge", stats, value, options);
    }
}

/// A service bundle wired to recording doubles.
pub struct Recorded {
    pub logger: RecordingLogger,
    pub tracer: RecordingTracer,
    pub metrics: RecordingMetrics,
}

impl Recorded {
    pub fn new() -> Self {
        Self {
            logger: RecordingLogger::default(),
            tracer: RecordingTracer::default(),
            metrics: RecordingMetrics::default(),
        }
    }

    pub fn services(&self) -> Services<Value> {
        Services::builder(json!({ "service_name": "widgets" }))
            .logger(Arc::new(self.logger.clone()))
            .tracer(Arc::new(self.tracer.clone()))
            .metrics(Arc::new(self.metrics.clone()))
            .build()
    }
}
