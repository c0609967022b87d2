//! Logger capability and its implementations.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::ObservabilityError;

/// Log severity, lowest first.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Structured logger: every record carries a JSON `data` object and a message.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, data: Value, message: &str);

    /// Derives a logger that adds `bindings` to every record.
    fn child(&self, bindings: Value) -> Result<Arc<dyn Logger>, ObservabilityError>;

    fn trace(&self, data: Value, message: &str) { self.log(Level::Trace, data, message) }
    fn debug(&self, data: Value, message: &str) { self.log(Level::Debug, data, message) }
    fn info(&self, data: Value, message: &str) { self.log(Level::Info, data, message) }
    fn warn(&self, data: Value, message: &str) { self.log(Level::Warn, data, message) }
    fn error(&self, data: Value, message: &str) { self.log(Level::Error, data, message) }
    fn fatal(&self, data: Value, message: &str) { self.log(Level::Fatal, data, message) }
}

/// Discards every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _data: Value, _message: &str) {}

    fn child(&self, _bindings: Value) -> Result<Arc<dyn Logger>, ObservabilityError> {
        Ok(Arc::new(NoopLogger))
    }
}

/// Emits records as `tracing` events.
///
/// Bindings and data are merged into one JSON object and attached as the
/// `fields` field, so a JSON subscriber keeps them structured. `Fatal` is
/// emitted at `ERROR` with `fatal = true`.
#[derive(Clone, Debug, Default)]
pub struct TracingLogger {
    bindings: Map<String, Value>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bindings(&self) -> &Map<String, Value> {
        &self.bindings
    }

    fn merged(&self, data: Value) -> Value {
        let mut fields = self.bindings.clone();
        merge_into(&mut fields, data);
        Value::Object(fields)
    }
}

fn merge_into(target: &mut Map<String, Value>, data: Value) {
    match data {
        Value::Object(map) => target.extend(map),
        Value::Null => {}
        other => {
            target.insert("data".to_owned(), other);
        }
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: Level, data: Value, message: &str) {
        let fields = self.merged(data);
        match level {
            Level::Trace => tracing::trace!(fields = %fields, "{message}"),
            Level::Debug => tracing::debug!(fields = %fields, "{message}"),
            Level::Info  => tracing::info!(fields = %fields, "{message}"),
            Level::Warn  => tracing::warn!(fields = %fields, "{message}"),
            Level::Error => tracing::error!(fields = %fields, "{message}"),
            Level::Fatal => tracing::error!(fatal = true, fields = %fields, "{message}"),
        }
    }

    fn child(&self, bindings: Value) -> Result<Arc<dyn Logger>, ObservabilityError> {
        let mut merged = self.bindings.clone();
        match bindings {
            Value::Object(map) => merged.extend(map),
            Value::Null => {}
            other => {
                return Err(ObservabilityError::Logger(format!(
                    "child bindings must be an object, got {other}"
                )));
            }
        }
        Ok(Arc::new(Self { bindings: merged }))
    }
}
