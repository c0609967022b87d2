//! In-process request injection.
//!
//! [`Server::inject`](crate::Server::inject) runs a request through the full
//! pipeline (routing, hooks, validation, handler) without opening a socket.

use std::net::SocketAddr;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value;

use crate::method::Method;

/// A simulated request. `From<&str>` gives a `GET` of that URL.
#[derive(Clone, Debug)]
pub struct InjectOptions {
    pub method: Method,
    /// Path with optional query, or an absolute URL.
    pub url: String,
    pub headers: HeaderMap,
    pub payload: Option<InjectPayload>,
    pub remote_addr: Option<SocketAddr>,
}

/// Body of an injected request.
#[derive(Clone, Debug)]
pub enum InjectPayload {
    /// Sent as `application/json` unless a content type is set.
    Json(Value),
    Raw(Bytes),
}

impl InjectOptions {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            payload: None,
            remote_addr: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
        }
    }

    /// Adds a header; invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn json(mut self, payload: Value) -> Self {
        self.payload = Some(InjectPayload::Json(payload));
        self
    }

    pub fn raw(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(InjectPayload::Raw(payload.into()));
        self
    }

    /// Splits the options into headers and body bytes, defaulting the
    /// content type for JSON payloads.
    pub(crate) fn into_body(self) -> (HeaderMap, Bytes) {
        let mut headers = self.headers;
        let body = match self.payload {
            None => Bytes::new(),
            Some(InjectPayload::Raw(bytes)) => bytes,
            Some(InjectPayload::Json(value)) => {
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                Bytes::from(value.to_string())
            }
        };
        (headers, body)
    }
}

impl From<&str> for InjectOptions {
    fn from(url: &str) -> Self {
        Self::new(Method::Get, url)
    }
}

impl From<(Method, &str)> for InjectOptions {
    fn from((method, url): (Method, &str)) -> Self {
        Self::new(method, url)
    }
}

/// The response to an injected request.
#[derive(Clone, Debug)]
pub struct InjectResponse {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
    /// Raw body bytes.
    pub payload: Bytes,
    /// The body parsed as JSON; `None` when empty or not JSON.
    pub result: Option<Value>,
}

impl InjectResponse {
    pub(crate) fn new(status_code: StatusCode, headers: HeaderMap, payload: Bytes) -> Self {
        let result = if payload.is_empty() {
            None
        } else {
            serde_json::from_slice(&payload).ok()
        };
        Self { status_code, headers, payload, result }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
