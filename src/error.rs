//! Unified error types.

use thiserror::Error;

use crate::http_error::HttpError;

/// Boxed, thread-safe error used wherever a caller-supplied error is carried.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by heureux's fallible server operations.
///
/// Request-level failures (400, 404, 500, ...) are expressed as
/// [`HttpError`] values on the response path, not as `Error`s. This type
/// surfaces infrastructure and registration failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid route `{path}`: {source}")]
    InvalidRoute {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("endpoint id `{0}` is already registered")]
    DuplicateEndpoint(String),

    #[error("invalid listen address `{0}`")]
    InvalidAddress(String),

    #[error("invalid request url `{0}`")]
    InvalidUrl(String),

    #[error("server has already started")]
    AlreadyStarted,

    #[error("server is not running")]
    NotRunning,

    #[error("response for endpoint `{endpoint}` violates its declared schema: {}", .errors.join("; "))]
    ResponseContract { endpoint: String, errors: Vec<String> },

    #[error(transparent)]
    Observability(#[from] ObservabilityError),
}

/// Failure raised by a logger or tracer collaborator.
///
/// Broken observability wiring is a configuration bug: the request pipeline
/// that hits one is aborted rather than served half-instrumented.
#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("logger failure: {0}")]
    Logger(String),

    #[error("tracer failure: {0}")]
    Tracer(String),
}

/// Error returned by an endpoint handler.
///
/// [`HttpError`]s keep their status and payload. Anything else is answered
/// with a `500` and logged by the response finalizer.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Other(BoxError),
}

impl HandlerError {
    /// Wraps an arbitrary error as a handler failure.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }
}

impl From<HandlerError> for HttpError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Http(e) => e,
            HandlerError::Other(e) => HttpError::internal("handler failed").with_source(e),
        }
    }
}
