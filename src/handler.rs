//! Handler type erasure.
//!
//! # How typed endpoints are stored
//!
//! Every endpoint has its own params / payload / query / response types, yet
//! the router keeps them all in one `matchit::Router` per method. Rust
//! collections hold one concrete type, so each endpoint is hidden behind the
//! [`ErasedEndpoint`] trait object:
//!
//! ```text
//! Endpoint::new(Method::Post, "/widgets")           ← user builds this
//!     .payload(widget_codec)                         ← B = Widget
//!     .handler(|req, h| async move { … })            ← typed closure
//!        ↓ erased right here into a BoundEndpoint<C>
//! Arc::new(TypedEndpoint { codecs, handler })        ← heap-allocated wrapper
//!        ↓ server.endpoint(bound) stores BoxedEndpoint<C> = Arc<dyn ErasedEndpoint<C>>
//! endpoint.call(raw, context) at request time        ← one vtable dispatch
//!        ↓
//! validate params → query → payload, run handler, serialize reply
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::http_error::HttpError;
use crate::lifecycle::EnrichedContext;
use crate::request::RawRequest;
use crate::response::WireResponse;

/// A heap-allocated, type-erased future.
///
/// `Send + 'static` lets tokio move it across worker threads.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What an endpoint produced: a response to send or an HTTP error.
#[derive(Debug)]
pub(crate) enum Outcome {
    Response(WireResponse),
    Error(HttpError),
}

/// Internal dispatch interface, implemented once per typed endpoint.
pub(crate) trait ErasedEndpoint<C>: Send + Sync {
    fn call(&self, request: RawRequest, context: EnrichedContext<C>) -> BoxFuture<Outcome>;
}

/// A type-erased endpoint shared across concurrent requests.
pub(crate) type BoxedEndpoint<C> = Arc<dyn ErasedEndpoint<C> + Send + Sync + 'static>;
