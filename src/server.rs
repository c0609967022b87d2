//! HTTP server and graceful shutdown.
//!
//! # Request pipeline
//!
//! Every request, whether it arrives over TCP or through
//! [`Server::inject`], takes the same path:
//!
//! 1. route lookup by method + path
//! 2. [`on_pre_auth`]: request logger and server span
//! 3. payload parsing, then params → query → payload validation
//! 4. the endpoint handler, with panics caught
//! 5. [`on_pre_response`]: contract check, logging, span close, metrics
//!
//! # Graceful shutdown
//!
//! [`Server::stop`] stops `listener.accept()` at once, asks every open
//! connection to finish its current request, and waits up to the stop
//! timeout before aborting whatever is left. [`Server::run`] does the same on
//! **SIGTERM** or Ctrl-C, which is what Kubernetes sends before SIGKILL.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures_util::FutureExt;
use http::header::HOST;
use http::{HeaderMap, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{Config, ServerOptions};
use crate::endpoint::{BoundEndpoint, EndpointSchemas};
use crate::error::Error;
use crate::handler::Outcome;
use crate::http_error::HttpError;
use crate::inject::{InjectOptions, InjectResponse};
use crate::lifecycle::{EnrichedContext, RequestContext, Target, on_pre_auth, on_pre_response};
use crate::method::Method;
use crate::request::{RawRequest, RequestInfo, parse_payload, parse_query};
use crate::response::WireResponse;
use crate::router::{Route, RouteInfo, Router};
use crate::services::Services;

/// The HTTP server.
///
/// Register endpoints with [`Server::endpoint`], then either
/// [`start`](Server::start) it, [`run`](Server::run) it until a shutdown
/// signal, or drive it in-process with [`inject`](Server::inject).
pub struct Server<C: Config = Value> {
    shared: Arc<Shared<C>>,
    next_anonymous_endpoint_id: usize,
    id: String,
    created: SystemTime,
    initialized: bool,
    running: Option<Running>,
}

/// State shared by every connection task. Written only before start.
struct Shared<C> {
    services: Arc<Services<C>>,
    router: Router<C>,
    schemas: HashMap<String, EndpointSchemas>,
    options: ServerOptions,
    /// `host:port` used to build absolute URLs when no `Host` header is sent.
    /// Rewritten on every start, possibly while old connection tasks still
    /// hold the state.
    authority: RwLock<String>,
    next_request_id: AtomicU64,
    in_flight: AtomicUsize,
    total: AtomicU64,
}

struct Running {
    addr: SocketAddr,
    started: SystemTime,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Identity and address of a server.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServerInfo {
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub created: u64,
    pub started: Option<u64>,
    pub host: String,
    pub port: u16,
    pub protocol: &'static str,
    pub uri: String,
}

/// Request counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Load {
    pub in_flight: usize,
    pub total: u64,
}

impl<C: Config> Server<C> {
    pub fn new(options: ServerOptions, services: Services<C>) -> Self {
        let created = SystemTime::now();
        let authority = format!("{}:{}", options.host, options.port);
        Self {
            shared: Arc::new(Shared {
                services: Arc::new(services),
                router: Router::new(),
                schemas: HashMap::new(),
                options,
                authority: RwLock::new(authority),
                next_request_id: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                total: AtomicU64::new(0),
            }),
            next_anonymous_endpoint_id: 0,
            id: format!("{}:{}", std::process::id(), millis(created)),
            created,
            initialized: false,
            running: None,
        }
    }

    /// The service bundle handed to every request.
    pub fn services(&self) -> &Arc<Services<C>> {
        &self.shared.services
    }

    pub fn options(&self) -> &ServerOptions {
        &self.shared.options
    }

    /// Registers an endpoint and returns its id.
    ///
    /// Endpoints without an explicit id get `endpoint-0`, `endpoint-1`, ...
    /// in registration order.
    pub fn endpoint(&mut self, endpoint: BoundEndpoint<C>) -> Result<String, Error> {
        if self.running.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let parts = endpoint.into_parts();
        let id = match parts.id {
            Some(id) => id,
            None => {
                let id = format!("endpoint-{}", self.next_anonymous_endpoint_id);
                self.next_anonymous_endpoint_id += 1;
                id
            }
        };

        let shared = Arc::get_mut(&mut self.shared).ok_or(Error::AlreadyStarted)?;
        if shared.schemas.contains_key(&id) {
            return Err(Error::DuplicateEndpoint(id));
        }
        shared.router.add(
            Route { id: id.clone(), endpoint: parts.endpoint },
            RouteInfo {
                id: id.clone(),
                method: parts.method,
                path: parts.path.clone(),
                description: parts.description,
                tags: parts.tags,
            },
        )?;

        debug!(id = %id, method = %parts.method, path = %parts.path, validated = !parts.schemas.is_empty(), "endpoint registered");
        shared.schemas.insert(id.clone(), parts.schemas);
        Ok(id)
    }

    pub fn info(&self) -> ServerInfo {
        let (host, port, uri) = match &self.running {
            Some(running) => (
                running.addr.ip().to_string(),
                running.addr.port(),
                format!("http://{}", running.addr),
            ),
            None => {
                let options = &self.shared.options;
                (options.host.clone(), options.port, format!("http://{}", self.shared.authority.read().as_str()))
            }
        };

        ServerInfo {
            id: self.id.clone(),
            created: millis(self.created),
            started: self.running.as_ref().map(|r| millis(r.started)),
            host,
            port,
            protocol: "http",
            uri,
        }
    }

    /// Checks the listen address and freezes nothing yet; endpoints can still
    /// be added until [`start`](Server::start).
    pub fn initialize(&mut self) -> Result<(), Error> {
        listen_addr(&self.shared.options)?;
        if !self.initialized {
            info!(routes = self.shared.router.table().len(), "heureux initialized");
            self.initialized = true;
        }
        Ok(())
    }

    /// Runs one request through the full pipeline without a socket.
    pub async fn inject(&self, options: impl Into<InjectOptions>) -> Result<InjectResponse, Error> {
        let options = options.into();
        let uri: Uri = options.url.parse().map_err(|_| Error::InvalidUrl(options.url.clone()))?;
        let method = options.method.into();
        let remote_addr = options.remote_addr;
        let (headers, body) = options.into_body();

        let inbound = Inbound {
            method,
            uri,
            headers,
            body: Ok(body),
            remote_addr,
            received_at: SystemTime::now(),
            received: Instant::now(),
        };
        let response = self.shared.handle(inbound).await;

        let (parts, body) = response.into_parts();
        let payload = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        Ok(InjectResponse::new(parts.status, parts.headers, payload))
    }

    pub fn load(&self) -> Load {
        Load {
            in_flight: self.shared.in_flight.load(Ordering::Relaxed),
            total: self.shared.total.load(Ordering::Relaxed),
        }
    }

    /// Binds the listener and starts accepting connections in the background.
    /// Returns the bound address (useful with port `0`).
    pub async fn start(&mut self) -> Result<SocketAddr, Error> {
        if self.running.is_some() {
            return Err(Error::AlreadyStarted);
        }
        self.initialize()?;

        let listener = TcpListener::bind(listen_addr(&self.shared.options)?).await?;
        let addr = listener.local_addr()?;
        *self.shared.authority.write() = addr.to_string();

        let (shutdown, closing) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, Arc::clone(&self.shared), closing));

        info!(addr = %addr, "heureux listening");
        self.running = Some(Running { addr, started: SystemTime::now(), shutdown, task });
        Ok(addr)
    }

    /// Stops accepting, drains open connections for up to `timeout`
    /// (default: the configured stop timeout), then aborts the rest.
    pub async fn stop(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        let Some(mut running) = self.running.take() else {
            return Err(Error::NotRunning);
        };
        let timeout = timeout.unwrap_or_else(|| self.shared.options.stop_timeout());

        running.shutdown.send_replace(true);
        match tokio::time::timeout(timeout, &mut running.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("server task failed: {e}"),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "drain timed out, aborting open connections");
                running.task.abort();
            }
        }
        Ok(())
    }

    /// Registered routes, in registration order.
    pub fn table(&self) -> &[RouteInfo] {
        self.shared.router.table()
    }

    /// Starts the server and stops it on the first shutdown signal.
    pub async fn run(mut self) -> Result<(), Error> {
        self.start().await?;
        shutdown_signal().await;
        info!("shutdown signal received");
        self.stop(None).await
    }
}

fn listen_addr(options: &ServerOptions) -> Result<SocketAddr, Error> {
    let host = match options.host.as_str() {
        "localhost" => "127.0.0.1",
        host => host,
    };
    let ip: IpAddr = host.parse().map_err(|_| Error::InvalidAddress(options.host.clone()))?;
    Ok(SocketAddr::new(ip, options.port))
}

fn millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop<C: Config>(
    listener: TcpListener,
    shared: Arc<Shared<C>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Shutdown first, so a stop request wins over queued connections.
            biased;

            _ = shutdown.changed() => {
                info!(open = tasks.len(), "stopping, draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, remote_addr) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let shared = Arc::clone(&shared);
                let mut closing = shutdown.clone();
                let io = TokioIo::new(stream);

                tasks.spawn(async move {
                    // Called once per request on the connection.
                    let svc = service_fn(move |req| {
                        let shared = Arc::clone(&shared);
                        async move { dispatch(shared, req, remote_addr).await }
                    });

                    // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                    let builder = ConnBuilder::new(TokioExecutor::new());
                    let conn = builder.serve_connection(io, svc);
                    tokio::pin!(conn);

                    tokio::select! {
                        res = conn.as_mut() => {
                            if let Err(e) = res {
                                error!(peer = %remote_addr, "connection error: {e}");
                            }
                            return;
                        }
                        _ = closing.changed() => {
                            conn.as_mut().graceful_shutdown();
                        }
                    }

                    if let Err(e) = conn.await {
                        error!(peer = %remote_addr, "connection error: {e}");
                    }
                });
            }

            // Reap finished connection tasks so the set does not grow forever.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}
    info!("heureux stopped");
}

async fn dispatch<C: Config>(
    shared: Arc<Shared<C>>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let received_at = SystemTime::now();
    let received = Instant::now();

    let (parts, body) = req.into_parts();
    let body = body.collect().await.map(|collected| collected.to_bytes()).map_err(|e| {
        warn!(peer = %remote_addr, "failed to read request body: {e}");
        HttpError::bad_request("Invalid request payload").with_source(e)
    });

    let inbound = Inbound {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
        remote_addr: Some(remote_addr),
        received_at,
        received,
    };
    Ok(shared.handle(inbound).await)
}

// ── Request handling ──────────────────────────────────────────────────────────

/// A fully read request, from the socket or from `inject`. The receipt
/// timestamps are taken before the body is read.
struct Inbound {
    method: http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, HttpError>,
    remote_addr: Option<SocketAddr>,
    received_at: SystemTime,
    received: Instant,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<C: Config> Shared<C> {
    async fn handle(&self, inbound: Inbound) -> http::Response<Full<Bytes>> {
        let _in_flight = InFlight::enter(&self.in_flight);
        self.total.fetch_add(1, Ordering::Relaxed);
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);

        let Inbound { method, uri, headers, body, remote_addr, received_at, received } = inbound;

        // Verbs outside the route tables cannot match anything.
        let Ok(method) = Method::try_from(&method) else {
            debug!(method = %method, "no route table for method");
            return WireResponse::from_error(&HttpError::not_found("Not Found")).into_http();
        };

        let url = absolute_url(&uri, &headers, self.authority.read().as_str());
        let info = Arc::new(RequestInfo {
            id,
            method,
            path: uri.path().to_owned(),
            url,
            headers,
            remote_addr,
            received_at,
            received,
        });

        let context = match on_pre_auth(&self.services, &info) {
            Ok(context) => context,
            Err(e) => {
                error!(request = id, error = %e, "request context initialization failed");
                RequestContext::Bare
            }
        };

        let route = self.router.lookup(method, &info.path);
        let outcome = match (&context, &route) {
            (RequestContext::Bare, _) => {
                Outcome::Error(HttpError::internal("request context unavailable"))
            }
            (RequestContext::Enriched(_), None) => Outcome::Error(HttpError::not_found("Not Found")),
            (RequestContext::Enriched(ctx), Some((route, params))) => match body {
                Ok(body) => self.call(route, ctx.clone(), Arc::clone(&info), params.clone(), &body).await,
                Err(err) => Outcome::Error(err),
            },
        };

        let target = Target {
            endpoint_id: route.as_ref().map(|(r, _)| r.id.as_str()),
            response_schema: route
                .as_ref()
                .and_then(|(r, _)| self.schemas.get(&r.id))
                .and_then(|s| s.response.as_ref()),
        };

        match on_pre_response(&context, &info, target, outcome, self.options.response_validation) {
            Outcome::Response(res) => res.into_http(),
            Outcome::Error(err) => WireResponse::from_error(&err).into_http(),
        }
    }

    async fn call(
        &self,
        route: &Route<C>,
        context: EnrichedContext<C>,
        info: Arc<RequestInfo>,
        params: Value,
        body: &Bytes,
    ) -> Outcome {
        let payload = match parse_payload(&info.headers, body) {
            Ok(payload) => payload,
            Err(err) => return Outcome::Error(err),
        };
        let query = parse_query(info.query_string());
        let raw = RawRequest { info, params, query, payload };

        let endpoint = Arc::clone(&route.endpoint);
        match AssertUnwindSafe(async move { endpoint.call(raw, context).await }).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(endpoint = %route.id, panic = %reason, "handler panicked");
                Outcome::Error(HttpError::internal("handler panicked"))
            }
        }
    }
}

fn absolute_url(uri: &Uri, headers: &HeaderMap, fallback: &str) -> String {
    let authority = uri
        .authority()
        .map(|a| a.as_str())
        .or_else(|| headers.get(HOST).and_then(|h| h.to_str().ok()))
        .unwrap_or(fallback);
    let scheme = uri.scheme_str().unwrap_or("http");
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    format!("{scheme}://{authority}{path}")
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C). On
/// Windows only Ctrl-C is available. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
