//! Incoming request types.
//!
//! [`RequestInfo`] is what the transport knows about a request before any
//! route code runs. [`EndpointRequest`] is the typed view a handler gets once
//! params, query and payload have passed validation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value, json};

use crate::http_error::HttpError;
use crate::method::Method;
use crate::services::{Logger, Services, Span};

/// Transport-level facts about one request.
#[derive(Clone, Debug)]
pub struct RequestInfo {
    pub id: u64,
    pub method: Method,
    pub path: String,
    /// Absolute URL: scheme, host, path and query.
    pub url: String,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    /// Wall-clock receipt time, for span start.
    pub received_at: SystemTime,
    /// Monotonic receipt time, for latency.
    pub received: Instant,
}

impl RequestInfo {
    /// Query string without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, q)| q)
    }

    /// Bindings for the request-scoped logger.
    pub(crate) fn log_bindings(&self) -> Value {
        json!({
            "req": {
                "id": self.id,
                "method": self.method.as_str(),
                "url": self.url,
                "remoteAddress": self.remote_addr.map(|a| a.to_string()),
            }
        })
    }

    pub(crate) fn latency_ms(&self) -> u64 {
        u64::try_from(self.received.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// A routed request waiting for validation.
#[derive(Debug)]
pub(crate) struct RawRequest {
    pub info: Arc<RequestInfo>,
    pub params: Value,
    pub query: Value,
    pub payload: Option<Value>,
}

/// Decodes a query string into an object of strings; repeated keys collect
/// into an array.
pub(crate) fn parse_query(query: Option<&str>) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(map)
}

/// Decodes a request body according to its content type.
///
/// An empty body is absent. JSON is assumed when no content type is sent.
pub(crate) fn parse_payload(headers: &HeaderMap, body: &Bytes) -> Result<Option<Value>, HttpError> {
    if body.is_empty() {
        return Ok(None);
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase());

    match content_type.as_deref() {
        None | Some("application/json") => serde_json::from_slice(body)
            .map(Some)
            .map_err(|e| HttpError::bad_request("Invalid request payload JSON format").with_source(e)),
        Some(ct) if ct.ends_with("+json") => serde_json::from_slice(body)
            .map(Some)
            .map_err(|e| HttpError::bad_request("Invalid request payload JSON format").with_source(e)),
        Some("application/x-www-form-urlencoded") => {
            let text = std::str::from_utf8(body)
                .map_err(|e| HttpError::bad_request("Invalid request payload encoding").with_source(e))?;
            Ok(Some(parse_query(Some(text))))
        }
        Some(ct) if ct.starts_with("text/") => String::from_utf8(body.to_vec())
            .map(|s| Some(Value::String(s)))
            .map_err(|e| HttpError::bad_request("Invalid request payload encoding").with_source(e)),
        Some(ct) => Err(HttpError::unsupported_media_type(format!("Unsupported Media Type: {ct}"))),
    }
}

/// A validated request, as seen by an endpoint handler.
pub struct EndpointRequest<C, P, B, Q> {
    info: Arc<RequestInfo>,
    params: P,
    payload: B,
    query: Q,
    logger: Arc<dyn Logger>,
    span: Arc<dyn Span>,
    services: Arc<Services<C>>,
}

impl<C, P, B, Q> EndpointRequest<C, P, B, Q> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        info: Arc<RequestInfo>,
        params: P,
        payload: B,
        query: Q,
        logger: Arc<dyn Logger>,
        span: Arc<dyn Span>,
        services: Arc<Services<C>>,
    ) -> Self {
        Self { info, params, payload, query, logger, span, services }
    }

    pub fn params(&self) -> &P { &self.params }
    pub fn payload(&self) -> &B { &self.payload }
    pub fn query(&self) -> &Q { &self.query }

    /// Request-scoped logger, bound to this request's id and URL.
    pub fn logger(&self) -> &Arc<dyn Logger> { &self.logger }
    pub fn span(&self) -> &Arc<dyn Span> { &self.span }
    pub fn services(&self) -> &Arc<Services<C>> { &self.services }

    pub fn info(&self) -> &RequestInfo { &self.info }
    pub fn id(&self) -> u64 { self.info.id }
    pub fn method(&self) -> Method { self.info.method }
    pub fn path(&self) -> &str { &self.info.path }
    pub fn url(&self) -> &str { &self.info.url }
    pub fn headers(&self) -> &HeaderMap { &self.info.headers }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.info.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Takes the decoded params, payload and query by value.
    pub fn into_parts(self) -> (P, B, Q) {
        (self.params, self.payload, self.query)
    }
}
