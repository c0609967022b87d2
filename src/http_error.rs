//! HTTP-level error objects.
//!
//! An [`HttpError`] is a response in disguise: it carries the status code and
//! the JSON payload the client will see. Handlers return it to short-circuit,
//! the validators raise it for malformed input, and the response finalizer
//! recognises it as the error path of the lifecycle.

use std::fmt;

use http::StatusCode;
use serde_json::{Map, Value, json};

use crate::error::BoxError;

/// A framework-level HTTP error.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    data: Option<Value>,
    source: Option<BoxError>,
}

/// The wire representation of an [`HttpError`].
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorOutput {
    pub status_code: StatusCode,
    pub payload: Value,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), data: None, source: None }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNSUPPORTED_MEDIA_TYPE, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Attaches structured data. Keys of an object value are merged into the
    /// output payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn message(&self) -> &str { &self.message }
    pub fn data(&self) -> Option<&Value> { self.data.as_ref() }

    pub fn source_message(&self) -> Option<String> {
        self.source.as_ref().map(ToString::to_string)
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Builds the status and JSON body sent to the client.
    ///
    /// Server errors never leak their message; the original is kept for logs.
    pub fn output(&self) -> ErrorOutput {
        let message = if self.is_server_error() {
            "An internal server error occurred"
        } else {
            self.message.as_str()
        };

        let mut payload = Map::new();
        payload.insert("statusCode".into(), json!(self.status.as_u16()));
        payload.insert(
            "error".into(),
            json!(self.status.canonical_reason().unwrap_or("Unknown")),
        );
        payload.insert("message".into(), json!(message));

        if let Some(Value::Object(data)) = &self.data {
            for (key, value) in data {
                payload.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        ErrorOutput { status_code: self.status, payload: Value::Object(payload) }
    }

    /// Structured form used in log records.
    pub(crate) fn to_log_value(&self) -> Value {
        json!({
            "status": self.status.as_u16(),
            "message": self.message,
            "data": self.data,
            "source": self.source_message(),
        })
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}
