//! Minimal heureux example: typed widget endpoints with validation, request
//! logging and tracing spans.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/widgets/42?verbose=true
//!   curl -X POST http://localhost:3000/widgets \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"bolt","sizes":[3,5]}'
//!   curl -X POST http://localhost:3000/widgets -d '{}'        # 400, every violation listed
//!   curl -X DELETE http://localhost:3000/widgets/42

use std::sync::Arc;

use heureux::schema::{self, Codec, SchemaExt};
use heureux::services::{MetricsFacade, OtelTracer, Services, TracingLogger};
use heureux::{Endpoint, HandlerError, HttpError, Method, Server, ServerOptions, ServiceConfig, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
struct NewWidget {
    name: String,
    #[serde(default)]
    sizes: Vec<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Widget {
    id: i64,
    name: String,
    sizes: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct WidgetId {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct Verbosity {
    verbose: Option<bool>,
}

fn widget_id() -> Codec<WidgetId> {
    Codec::new(schema::object().field("id", schema::integer_from_string()).named("WidgetId"))
}

fn widget() -> Codec<Widget> {
    Codec::new(
        schema::object()
            .field("id", schema::integer())
            .field("name", schema::string())
            .field("sizes", schema::array(schema::number()))
            .named("Widget"),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut options = ServerOptions::from_env()?;
    if options.port == 0 {
        options.port = 3000;
    }

    let services = Services::builder(ServiceConfig::new("widgets"))
        .logger(Arc::new(TracingLogger::new()))
        .metrics(Arc::new(MetricsFacade))
        .tracer(Arc::new(OtelTracer::new("widgets")))
        .build();

    let mut server = Server::new(options, services);

    server.endpoint(
        Endpoint::new(Method::Get, "/widgets/{id}")
            .id("get-widget")
            .description("Fetch one widget")
            .params(widget_id())
            .query(Codec::<Verbosity>::new(
                schema::partial().field("verbose", schema::boolean_from_string()),
            ))
            .response(widget())
            .handler(|req, h| async move {
                let id = req.params().id;
                if id == 0 {
                    return Err(HandlerError::from(HttpError::not_found("no such widget")));
                }
                if req.query().verbose.unwrap_or(false) {
                    req.logger().debug(serde_json::json!({ "id": id }), "verbose lookup");
                }
                Ok(h.response(Widget { id, name: "bolt".into(), sizes: vec![3.0] }))
            }),
    )?;

    server.endpoint(
        Endpoint::new(Method::Post, "/widgets")
            .id("create-widget")
            .tag("write")
            .payload(Codec::<NewWidget>::new(
                schema::object()
                    .field("name", schema::string())
                    .field("sizes", schema::array(schema::number()).optional()),
            ))
            .response(widget())
            .handler(|req, h| async move {
                let (_, input, _) = req.into_parts();
                let created = Widget { id: 99, name: input.name, sizes: input.sizes };
                Ok(h.response(created).created("/widgets/99"))
            }),
    )?;

    // DELETE /widgets/{id} → 204 No Content
    server.endpoint(
        Endpoint::new(Method::Delete, "/widgets/{id}")
            .params(widget_id())
            .handler(|_req, h| async move { Ok(h.empty().code(StatusCode::NO_CONTENT)) }),
    )?;

    for route in server.table() {
        tracing::info!(id = %route.id, method = %route.method, path = %route.path, "route");
    }

    server.run().await?;
    Ok(())
}
