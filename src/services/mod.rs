//! The service bundle: config plus the logger, metrics and tracer every
//! request can reach.
//!
//! Collaborators left unset get a no-op implementation, so a server built
//! from nothing but a config is fully usable:
//!
//! ```rust
//! use heureux::services::Services;
//! use serde_json::json;
//!
//! let services = Services::new(json!({ "service_name": "widgets" }));
//! services.logger.info(json!({}), "goes nowhere");
//! ```

mod logger;
mod metrics;
mod otel;
mod tracer;

use std::fmt;
use std::sync::Arc;

pub use logger::{Level, Logger, NoopLogger, TracingLogger};
pub use metrics::{MetricOptions, Metrics, MetricsFacade, NoopMetrics};
pub use otel::{OtelSpan, OtelTracer};
pub use tracer::{NoopSpan, NoopTracer, Span, SpanContext, SpanOptions, Tags, Tracer, tags};

/// Process-wide collaborators, shared read-only by every request.
pub struct Services<C> {
    pub config: C,
    pub logger: Arc<dyn Logger>,
    pub metrics: Arc<dyn Metrics>,
    pub tracer: Arc<dyn Tracer>,
}

impl<C> Services<C> {
    /// A bundle with no-op logger, metrics and tracer.
    pub fn new(config: C) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: C) -> ServicesBuilder<C> {
        ServicesBuilder { config, logger: None, metrics: None, tracer: None }
    }
}

impl<C: fmt::Debug> fmt::Debug for Services<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Assembles a [`Services`] bundle.
pub struct ServicesBuilder<C> {
    config: C,
    logger: Option<Arc<dyn Logger>>,
    metrics: Option<Arc<dyn Metrics>>,
    tracer: Option<Arc<dyn Tracer>>,
}

impl<C> ServicesBuilder<C> {
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn build(self) -> Services<C> {
        let logger: Arc<dyn Logger> = match self.logger {
            Some(logger) => logger,
            None => Arc::new(NoopLogger),
        };
        let metrics: Arc<dyn Metrics> = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(NoopMetrics),
        };
        let tracer: Arc<dyn Tracer> = match self.tracer {
            Some(tracer) => tracer,
            None => Arc::new(NoopTracer),
        };
        Services { config: self.config, logger, metrics, tracer }
    }
}
