//! Endpoint declarations.
//!
//! An [`Endpoint`] bundles a route (method + path), optional metadata and
//! the codecs for each part of the request and response. The codec setters
//! change the endpoint's type parameters, so the handler comes last:
//! [`Endpoint::handler`] turns the builder into a [`BoundEndpoint`].
//!
//! ```rust,ignore
//! let id = server.endpoint(
//!     Endpoint::new(Method::Post, "/widgets")
//!         .description("Create a widget")
//!         .payload(Codec::<NewWidget>::new(new_widget_schema()))
//!         .response(Codec::<Widget>::new(widget_schema()))
//!         .handler(|req, h| async move {
//!             let widget = store(req.payload()).await?;
//!             Ok(h.response(widget).code(StatusCode::CREATED))
//!         }),
//! )?;
//! ```
//!
//! Parts without a codec are handed over as raw [`serde_json::Value`]s.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::HandlerError;
use crate::handler::{BoxFuture, BoxedEndpoint, ErasedEndpoint, Outcome};
use crate::http_error::HttpError;
use crate::lifecycle::EnrichedContext;
use crate::method::Method;
use crate::request::{EndpointRequest, RawRequest};
use crate::response::{Reply, ResponseToolkit};
use crate::schema::{Codec, SchemaRef};
use crate::validation::{Source, validate};

/// Result of an endpoint handler.
pub type HandlerResult<R> = Result<Reply<R>, HandlerError>;

type HandlerFn<C, P, B, Q, R> =
    dyn Fn(EndpointRequest<C, P, B, Q>, ResponseToolkit<R>) -> BoxFuture<HandlerResult<R>> + Send + Sync;

/// Route metadata shared by the builder and the finished endpoint.
struct Meta {
    method: Method,
    path: String,
    id: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
}

macro_rules! metadata_setters {
    () => {
        /// Explicit endpoint id. Omitted ids are assigned as `endpoint-<n>`.
        pub fn id(mut self, id: impl Into<String>) -> Self {
            self.meta.id = Some(id.into());
            self
        }

        pub fn description(mut self, description: impl Into<String>) -> Self {
            self.meta.description = Some(description.into());
            self
        }

        pub fn tag(mut self, tag: impl Into<String>) -> Self {
            self.meta.tags.push(tag.into());
            self
        }

        pub fn tags<I, S>(mut self, tags: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            self.meta.tags.extend(tags.into_iter().map(Into::into));
            self
        }

        pub fn method(&self) -> Method { self.meta.method }
        pub fn path(&self) -> &str { &self.meta.path }
    };
}

/// A route declaration with typed params `P`, payload `B`, query `Q` and
/// response `R`. Finish it with [`handler`](Endpoint::handler).
pub struct Endpoint<C, P = Value, B = Value, Q = Value, R = Value> {
    meta: Meta,
    params: Option<Codec<P>>,
    payload: Option<Codec<B>>,
    query: Option<Codec<Q>>,
    response: Option<Codec<R>>,
    config: PhantomData<fn() -> C>,
}

impl<C> Endpoint<C> {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            meta: Meta { method, path: path.into(), id: None, description: None, tags: Vec::new() },
            params: None,
            payload: None,
            query: None,
            response: None,
            config: PhantomData,
        }
    }
}

impl<C, P, B, Q, R> Endpoint<C, P, B, Q, R> {
    metadata_setters!();

    /// Declares the path-parameter codec.
    pub fn params<P2>(self, codec: Codec<P2>) -> Endpoint<C, P2, B, Q, R> {
        Endpoint {
            meta: self.meta,
            params: Some(codec),
            payload: self.payload,
            query: self.query,
            response: self.response,
            config: PhantomData,
        }
    }

    /// Declares the request-body codec.
    pub fn payload<B2>(self, codec: Codec<B2>) -> Endpoint<C, P, B2, Q, R> {
        Endpoint {
            meta: self.meta,
            params: self.params,
            payload: Some(codec),
            query: self.query,
            response: self.response,
            config: PhantomData,
        }
    }

    /// Declares the query-string codec.
    pub fn query<Q2>(self, codec: Codec<Q2>) -> Endpoint<C, P, B, Q2, R> {
        Endpoint {
            meta: self.meta,
            params: self.params,
            payload: self.payload,
            query: Some(codec),
            response: self.response,
            config: PhantomData,
        }
    }

    /// Declares the response codec. Outgoing payloads are encoded with it
    /// and checked against its schema.
    pub fn response<R2>(self, codec: Codec<R2>) -> Endpoint<C, P, B, Q, R2> {
        Endpoint {
            meta: self.meta,
            params: self.params,
            payload: self.payload,
            query: self.query,
            response: Some(codec),
            config: PhantomData,
        }
    }

    /// Attaches the handler. The codecs are fixed from here on.
    ///
    /// ```compile_fail
    /// # use heureux::{Endpoint, Method};
    /// # use heureux::schema::{self, Codec};
    /// let _ = Endpoint::<serde_json::Value>::new(Method::Post, "/widgets")
    ///     .handler(|_req, h| async move { Ok(h.empty()) })
    ///     .payload(Codec::<serde_json::Value>::new(schema::unknown()));
    /// ```
    pub fn handler<F, Fut, O>(self, handler: F) -> BoundEndpoint<C>
    where
        F: Fn(EndpointRequest<C, P, B, Q>, ResponseToolkit<R>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, HandlerError>> + Send + 'static,
        O: Into<Reply<R>>,
        C: Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        B: DeserializeOwned + Send + 'static,
        Q: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let erased = move |req: EndpointRequest<C, P, B, Q>, h: ResponseToolkit<R>| -> BoxFuture<HandlerResult<R>> {
            let fut = handler(req, h);
            Box::pin(async move { fut.await.map(Into::into) })
        };

        let schemas = EndpointSchemas {
            params: self.params.as_ref().map(|c| Arc::clone(c.schema())),
            payload: self.payload.as_ref().map(|c| Arc::clone(c.schema())),
            query: self.query.as_ref().map(|c| Arc::clone(c.schema())),
            response: self.response.as_ref().map(|c| Arc::clone(c.schema())),
        };
        let endpoint: BoxedEndpoint<C> = Arc::new(TypedEndpoint {
            params: self.params,
            payload: self.payload,
            query: self.query,
            handler: Box::new(erased),
        });

        BoundEndpoint { meta: self.meta, schemas, endpoint }
    }
}

/// An endpoint with its handler attached, ready for
/// [`Server::endpoint`](crate::Server::endpoint). Metadata can still be
/// set; codecs cannot.
pub struct BoundEndpoint<C> {
    meta: Meta,
    schemas: EndpointSchemas,
    endpoint: BoxedEndpoint<C>,
}

impl<C> BoundEndpoint<C> {
    metadata_setters!();

    pub(crate) fn into_parts(self) -> EndpointParts<C> {
        let Meta { method, path, id, description, tags } = self.meta;
        EndpointParts { method, path, id, description, tags, schemas: self.schemas, endpoint: self.endpoint }
    }
}

/// Registration-time view of an endpoint, with its types erased.
pub(crate) struct EndpointParts<C> {
    pub method: Method,
    pub path: String,
    pub id: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub schemas: EndpointSchemas,
    pub endpoint: BoxedEndpoint<C>,
}

/// The schemas an endpoint declared, keyed later by endpoint id.
#[derive(Clone, Default)]
pub(crate) struct EndpointSchemas {
    pub params: Option<SchemaRef>,
    pub payload: Option<SchemaRef>,
    pub query: Option<SchemaRef>,
    pub response: Option<SchemaRef>,
}

impl EndpointSchemas {
    pub fn is_empty(&self) -> bool {
        self.params.is_none() && self.payload.is_none() && self.query.is_none() && self.response.is_none()
    }
}

/// Concrete endpoint behind [`ErasedEndpoint`], bridging typed handlers to
/// the untyped pipeline.
struct TypedEndpoint<C, P, B, Q, R> {
    params: Option<Codec<P>>,
    payload: Option<Codec<B>>,
    query: Option<Codec<Q>>,
    handler: Box<HandlerFn<C, P, B, Q, R>>,
}

impl<C, P, B, Q, R> TypedEndpoint<C, P, B, Q, R>
where
    P: DeserializeOwned,
    B: DeserializeOwned,
    Q: DeserializeOwned,
{
    /// Validates params, then query, then payload. The first failing source
    /// ends the request; later sources are never decoded.
    fn decode(&self, raw: &RawRequest) -> Result<(P, Q, B), HttpError> {
        let params = decode_source(self.params.as_ref(), Some(&raw.params), Source::Params)?;
        let query = decode_source(self.query.as_ref(), Some(&raw.query), Source::Query)?;
        let payload = decode_source(self.payload.as_ref(), raw.payload.as_ref(), Source::Payload)?;
        Ok((params, query, payload))
    }
}

fn decode_source<T: DeserializeOwned>(
    codec: Option<&Codec<T>>,
    input: Option<&Value>,
    source: Source,
) -> Result<T, HttpError> {
    match codec {
        Some(codec) => validate(input, codec, source),
        None => serde_json::from_value(input.cloned().unwrap_or(Value::Null)).map_err(|e| {
            HttpError::bad_request(format!("Invalid request {source} input")).with_source(e)
        }),
    }
}

impl<C, P, B, Q, R> ErasedEndpoint<C> for TypedEndpoint<C, P, B, Q, R>
where
    C: Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    B: DeserializeOwned + Send + 'static,
    Q: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn call(&self, request: RawRequest, context: EnrichedContext<C>) -> BoxFuture<Outcome> {
        let (params, query, payload) = match self.decode(&request) {
            Ok(decoded) => decoded,
            Err(err) => return Box::pin(async move { Outcome::Error(err) }),
        };

        let EnrichedContext { logger, span, services } = context;
        let req = EndpointRequest::new(request.info, params, payload, query, logger, span, services);
        let fut = (self.handler)(req, ResponseToolkit::new());

        Box::pin(async move {
            match fut.await {
                Ok(reply) => match reply.into_wire() {
                    Ok(wire) => Outcome::Response(wire),
                    Err(err) => Outcome::Error(err),
                },
                Err(err) => Outcome::Error(err.into()),
            }
        })
    }
}
