//! Outgoing response types.
//!
//! A handler answers with a [`Reply`]: either a bare payload (sent as
//! `200 OK`) or an [`EndpointResponse`] built through the
//! [`ResponseToolkit`] when it needs a different status or extra headers.
//!
//! ```rust,ignore
//! |req, h| async move {
//!     let widget = create(req.payload()).await?;
//!     Ok(h.response(widget).created(format!("/widgets/{}", widget.id)))
//! }
//! ```

use std::marker::PhantomData;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;

use crate::http_error::HttpError;

// ── EndpointResponse ──────────────────────────────────────────────────────────

/// A typed response under construction. Defaults to `200 OK`.
#[derive(Debug)]
pub struct EndpointResponse<R> {
    status: StatusCode,
    headers: Vec<(String, String)>,
    source: Option<R>,
}

impl<R> EndpointResponse<R> {
    fn new(source: Option<R>) -> Self {
        Self { status: StatusCode::OK, headers: Vec::new(), source }
    }

    pub fn code(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    /// `201 Created` with a `location` header.
    pub fn created(self, uri: impl AsRef<str>) -> Self {
        self.code(StatusCode::CREATED).location(uri)
    }

    pub fn location(self, uri: impl AsRef<str>) -> Self {
        self.header(LOCATION.as_str(), uri.as_ref())
    }

    /// `302 Found` with a `location` header.
    pub fn redirect(self, uri: impl AsRef<str>) -> Self {
        self.code(StatusCode::FOUND).location(uri)
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn source(&self) -> Option<&R> { self.source.as_ref() }
}

// ── ResponseToolkit ───────────────────────────────────────────────────────────

/// Handed to every handler to build typed responses.
pub struct ResponseToolkit<R> {
    _marker: PhantomData<fn() -> R>,
}

impl<R> ResponseToolkit<R> {
    pub(crate) fn new() -> Self {
        Self { _marker: PhantomData }
    }

    pub fn response(&self, value: R) -> EndpointResponse<R> {
        EndpointResponse::new(Some(value))
    }

    /// A response without a body.
    pub fn empty(&self) -> EndpointResponse<R> {
        EndpointResponse::new(None)
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// What a handler resolves to.
#[derive(Debug)]
pub enum Reply<R> {
    Payload(R),
    Response(EndpointResponse<R>),
}

impl<R> From<EndpointResponse<R>> for Reply<R> {
    fn from(response: EndpointResponse<R>) -> Self {
        Self::Response(response)
    }
}

impl<R: Serialize> Reply<R> {
    /// Serializes the typed body. Schema checks happen later, in the
    /// response finalizer.
    pub(crate) fn into_wire(self) -> Result<WireResponse, HttpError> {
        let (status, headers, source) = match self {
            Self::Payload(value) => (StatusCode::OK, Vec::new(), Some(value)),
            Self::Response(r) => (r.status, r.headers, r.source),
        };

        let body = match source {
            Some(value) => match serde_json::to_value(&value) {
                Ok(Value::Null) => None,
                Ok(v) => Some(v),
                Err(e) => return Err(HttpError::internal("response serialization failed").with_source(e)),
            },
            None => None,
        };

        // Hapi-style empty status: a bare 200 without a body is a 204.
        let status = if status == StatusCode::OK && body.is_none() {
            StatusCode::NO_CONTENT
        } else {
            status
        };

        Ok(WireResponse { status, headers, body })
    }
}

// ── WireResponse ──────────────────────────────────────────────────────────────

/// An untyped response on its way out.
#[derive(Clone, Debug, PartialEq)]
pub struct WireResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl WireResponse {
    pub(crate) fn from_error(err: &HttpError) -> Self {
        let out = err.output();
        Self { status: out.status_code, headers: Vec::new(), body: Some(out.payload) }
    }

    /// Encodes the response for hyper.
    pub(crate) fn into_http(self) -> http::Response<Full<Bytes>> {
        let bytes = match &self.body {
            Some(v) => Bytes::from(v.to_string()),
            None => Bytes::new(),
        };

        let mut response = http::Response::new(Full::new(bytes));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        if self.body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        }
        for (name, value) in self.headers {
            match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
                (Ok(n), Ok(v)) => {
                    headers.append(n, v);
                }
                _ => tracing::warn!(header = %name, "dropping invalid response header"),
            }
        }
        response
    }
}
