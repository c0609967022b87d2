//! # heureux
//!
//! Typed endpoints over a minimal hyper server. Every route gets a request
//! logger, a server tracing span and schema validation of its params, query,
//! payload and response, with no per-handler wiring.
//!
//! ## What a request goes through
//!
//! - Radix-tree routing per method via [`matchit`]
//! - A child [`Logger`](services::Logger) bound to the request and a span
//!   parented to any upstream W3C trace context
//! - Params → query → payload validation; the first failing part answers
//!   `400` with every violation listed
//! - The handler, with typed inputs and a typed response builder
//! - Response contract check, outcome logging, span close and metrics
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use heureux::schema::{self, Codec};
//! use heureux::services::{Services, TracingLogger};
//! use heureux::{Endpoint, Method, Server, ServerOptions};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Deserialize, Serialize)]
//! struct Widget { name: String }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), heureux::Error> {
//!     let services = Services::builder(serde_json::json!({ "service_name": "widgets" }))
//!         .logger(Arc::new(TracingLogger::new()))
//!         .build();
//!     let mut server = Server::new(ServerOptions::bind("0.0.0.0", 3000), services);
//!
//!     server.endpoint(
//!         Endpoint::new(Method::Post, "/widgets")
//!             .payload(Codec::<Widget>::new(schema::object().field("name", schema::string())))
//!             .handler(|req, h| async move {
//!                 let name = req.payload().name.clone();
//!                 Ok(h.response(serde_json::json!({ "name": name })).created("/widgets/1"))
//!             }),
//!     )?;
//!
//!     server.run().await
//! }
//! ```

mod endpoint;
mod error;
mod handler;
mod http_error;
mod inject;
mod lifecycle;
mod method;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod schema;
pub mod services;
pub mod validation;

pub use config::{Config, ResponseValidation, ServerOptions, ServiceConfig};
pub use endpoint::{BoundEndpoint, Endpoint, HandlerResult};
pub use error::{BoxError, Error, HandlerError, ObservabilityError};
pub use handler::BoxFuture;
pub use http::StatusCode;
pub use http_error::{ErrorOutput, HttpError};
pub use inject::{InjectOptions, InjectPayload, InjectResponse};
pub use lifecycle::{LATENCY_METRIC, REQUESTS_METRIC};
pub use method::Method;
pub use request::{EndpointRequest, RequestInfo};
pub use response::{EndpointResponse, Reply, ResponseToolkit};
pub use router::RouteInfo;
pub use schema::Codec;
pub use server::{Load, Server, ServerInfo};
