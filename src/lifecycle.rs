//! Per-request lifecycle hooks.
//!
//! [`on_pre_auth`] runs before routing reaches the handler and turns the
//! service bundle into a request context (child logger, server span).
//! [`on_pre_response`] runs once on the way out: it checks the response
//! contract, logs the outcome, tags and finishes the span and records
//! request metrics.

use std::sync::Arc;

use serde_json::{Value, json};

use crate::config::{Config, ResponseValidation};
use crate::error::{Error, ObservabilityError};
use crate::handler::Outcome;
use crate::http_error::HttpError;
use crate::request::RequestInfo;
use crate::response::WireResponse;
use crate::schema::{SchemaRef, encode_value};
use crate::services::{Logger, MetricOptions, Services, Span, SpanOptions, Tags, tags};
use crate::validation::failure;

/// Counter of finished requests.
pub const REQUESTS_METRIC: &str = "http.server.requests";
/// Histogram of request latency in milliseconds.
pub const LATENCY_METRIC: &str = "http.server.latency_ms";

/// Everything the pre-auth hook attaches to a request.
pub struct EnrichedContext<C> {
    pub logger: Arc<dyn Logger>,
    pub span: Arc<dyn Span>,
    pub services: Arc<Services<C>>,
}

impl<C> Clone for EnrichedContext<C> {
    fn clone(&self) -> Self {
        Self {
            logger: Arc::clone(&self.logger),
            span: Arc::clone(&self.span),
            services: Arc::clone(&self.services),
        }
    }
}

/// Whether a request went through the pre-auth hook.
///
/// The finalizer only acts on [`RequestContext::Enriched`]; a `Bare`
/// request has no span to close and no scoped logger to write to.
pub enum RequestContext<C> {
    Enriched(EnrichedContext<C>),
    Bare,
}

impl<C> RequestContext<C> {
    pub fn enriched(&self) -> Option<&EnrichedContext<C>> {
        match self {
            Self::Enriched(ctx) => Some(ctx),
            Self::Bare => None,
        }
    }
}

/// Builds the request context: a child logger bound to the request and a
/// server span named after the URL, parented to any upstream trace.
///
/// The span starts at the receipt time so queueing delay is part of it.
/// Logger and tracer failures are returned, never swallowed.
pub fn on_pre_auth<C: Config>(
    services: &Arc<Services<C>>,
    info: &RequestInfo,
) -> Result<RequestContext<C>, ObservabilityError> {
    let logger = services.logger.child(info.log_bindings())?;
    let parent = services.tracer.extract(&info.headers)?;

    let mut span_tags = Tags::new();
    span_tags.insert(tags::COMPONENT.into(), json!(services.config.service_name()));
    span_tags.insert(tags::SPAN_KIND.into(), json!(tags::SPAN_KIND_RPC_SERVER));
    span_tags.insert(tags::HTTP_METHOD.into(), json!(info.method.as_str()));
    span_tags.insert(tags::HTTP_URL.into(), json!(info.url));

    let span = services.tracer.start_span(
        &info.url,
        SpanOptions { child_of: parent, start_time: info.received_at, tags: span_tags },
    )?;

    Ok(RequestContext::Enriched(EnrichedContext {
        logger,
        span,
        services: Arc::clone(services),
    }))
}

/// The route a finished request was dispatched to.
#[derive(Clone, Copy, Default)]
pub struct Target<'a> {
    pub endpoint_id: Option<&'a str>,
    pub response_schema: Option<&'a SchemaRef>,
}

/// Finalizes one request and returns what should be sent.
///
/// Successful responses with a body are encoded through the declared
/// response schema first. A violation is logged as a contract error and,
/// under [`ResponseValidation::Enforce`], replaces the response with a 500.
/// Error outcomes are never contract-checked.
pub fn on_pre_response<C>(
    context: &RequestContext<C>,
    info: &RequestInfo,
    target: Target<'_>,
    outcome: Outcome,
    mode: ResponseValidation,
) -> Outcome {
    let RequestContext::Enriched(ctx) = context else {
        return outcome;
    };

    let outcome = check_contract(ctx, target, outcome, mode);
    let latency = info.latency_ms();

    let status = match &outcome {
        Outcome::Error(err) => {
            let output = err.output();
            ctx.logger.info(
                json!({
                    "latency": latency,
                    "err": err.to_log_value(),
                    "res": { "statusCode": output.status_code.as_u16(), "payload": output.payload },
                }),
                "request error",
            );
            err.status()
        }
        Outcome::Response(res) => {
            ctx.logger.info(
                json!({
                    "latency": latency,
                    "res": { "statusCode": res.status.as_u16(), "payload": res.body },
                }),
                "sending response",
            );
            res.status
        }
    };

    let mut status_tag = Tags::new();
    status_tag.insert(tags::HTTP_STATUS_CODE.into(), json!(status.as_u16()));
    ctx.span.add_tags(status_tag);
    ctx.span.finish();

    let options = MetricOptions::new()
        .tag("method", info.method.as_str())
        .tag("status", status.as_str())
        .tag("endpoint", target.endpoint_id.unwrap_or("unmatched"));
    ctx.services.metrics.increment(&[REQUESTS_METRIC], 1.0, &options);
    ctx.services.metrics.histogram(&[LATENCY_METRIC], latency as f64, &options);

    outcome
}

fn check_contract<C>(
    ctx: &EnrichedContext<C>,
    target: Target<'_>,
    outcome: Outcome,
    mode: ResponseValidation,
) -> Outcome {
    let (Outcome::Response(res), Some(schema)) = (&outcome, target.response_schema) else {
        return outcome;
    };
    let Some(body) = &res.body else {
        return outcome;
    };

    match encode_value(schema.as_ref(), body) {
        Ok(encoded) => {
            let Outcome::Response(res) = outcome else {
                return outcome;
            };
            let body = match encoded {
                Value::Null => None,
                other => Some(other),
            };
            Outcome::Response(WireResponse { body, ..res })
        }
        Err(errors) => {
            let violation = Error::ResponseContract {
                endpoint: target.endpoint_id.unwrap_or_default().to_owned(),
                errors: failure(&errors),
            };
            ctx.logger.error(
                json!({ "err": violation.to_string(), "mode": mode }),
                "response contract violation",
            );
            match mode {
                ResponseValidation::Enforce => Outcome::Error(
                    HttpError::internal("response contract violation").with_source(violation),
                ),
                ResponseValidation::Log => outcome,
            }
        }
    }
}
