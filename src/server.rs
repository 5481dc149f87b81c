//! The base server: timeouts, CORS and TLS around a [`Router`].
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C (or when the signal given to
//! [`serve_with_shutdown`](BaseServer::serve_with_shutdown) resolves) the
//! server:
//! 1. stops accepting connections;
//! 2. lets every in-flight connection task run to completion;
//! 3. returns.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::ORIGIN;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::middleware::Cors;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::tls::{self, TlsIdentity};

/// Time allowed to read a request, headers and body.
pub const READ_TIMEOUT: Duration = Duration::from_secs(2 * 60);
/// Time allowed from a fully read request to a ready response.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// State shared by every connection task.
struct Shared {
    router: Router,
    cors: Cors,
    read_timeout: Duration,
    write_timeout: Duration,
}

/// A fully configured HTTP server, not yet listening.
///
/// ```rust,no_run
/// use groundwork::{BaseHandler, BaseServer, RouterConfig, base_router};
///
/// # async fn run() -> Result<(), groundwork::Error> {
/// let router = base_router(BaseHandler::default(), "1.2.3", RouterConfig::from_file("swagger.yaml")?)?;
/// BaseServer::new(router, None, "0.0.0.0:8080")?.serve().await
/// # }
/// ```
pub struct BaseServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    tls: Option<Arc<ServerConfig>>,
}

impl BaseServer {
    /// Wraps `router` in the fixed CORS policy and timeouts, and, when an
    /// identity is given, the fixed TLS policy.
    pub fn new(router: Router, identity: Option<TlsIdentity>, listen_addr: &str) -> Result<Self, Error> {
        let addr = listen_addr.parse().map_err(|source| Error::Address {
            addr: listen_addr.to_owned(),
            source,
        })?;
        let tls = identity.map(tls::server_config).transpose()?;
        let shared = Arc::new(Shared {
            router,
            cors: Cors::base(),
            read_timeout: READ_TIMEOUT,
            write_timeout: WRITE_TIMEOUT,
        });
        Ok(Self { addr, shared, tls })
    }

    pub fn addr(&self) -> SocketAddr { self.addr }
    pub fn read_timeout(&self) -> Duration { self.shared.read_timeout }
    pub fn write_timeout(&self) -> Duration { self.shared.write_timeout }
    pub fn cors(&self) -> &Cors { &self.shared.cors }
    pub fn tls_config(&self) -> Option<&Arc<ServerConfig>> { self.tls.as_ref() }

    /// Binds the configured address and serves until SIGTERM or Ctrl-C.
    pub async fn serve(self) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves on an already bound `listener` until `signal` resolves, then
    /// drains in-flight connections.
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let local = listener.local_addr()?;
        let acceptor = self.tls.map(TlsAcceptor::from);
        info!(addr = %local, tls = acceptor.is_some(), "listening");

        let mut tasks = tokio::task::JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Shutdown is checked first so a signal stops accepting at once.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
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
                    let shared = Arc::clone(&self.shared);
                    let acceptor = acceptor.clone();

                    tasks.spawn(async move {
                        match acceptor {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(stream) => serve_connection(stream, shared, remote_addr).await,
                                Err(e) => warn!(peer = %remote_addr, "tls handshake failed: {e}"),
                            },
                            None => serve_connection(stream, shared, remote_addr).await,
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("stopped");
        Ok(())
    }
}

/// Runs HTTP/1.1 or HTTP/2, whichever the client speaks, on one connection.
async fn serve_connection<I>(io: I, shared: Arc<Shared>, remote_addr: SocketAddr)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let read_timeout = shared.read_timeout;
    let svc = service_fn(move |req| {
        let shared = Arc::clone(&shared);
        async move { dispatch(shared, req, remote_addr).await }
    });

    let mut conn = ConnBuilder::new(TokioExecutor::new());
    conn.http1()
        .timer(TokioTimer::new())
        .header_read_timeout(read_timeout);

    if let Err(e) = conn.serve_connection(TokioIo::new(io), svc).await {
        debug!(peer = %remote_addr, "connection error: {e}");
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads one request, applies CORS, routes it, and produces one response.
///
/// Every failure becomes a response, so hyper never sees an error.
async fn dispatch(
    shared: Arc<Shared>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match tokio::time::timeout(shared.read_timeout, body.collect()).await {
        Ok(Ok(collected)) => collected.to_bytes(),
        Ok(Err(e)) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_hyper());
        }
        Err(_) => {
            warn!(peer = %remote_addr, "request body read timed out");
            return Ok(Response::status(StatusCode::REQUEST_TIMEOUT).into_hyper());
        }
    };
    let req = Request::from_parts(parts, body, remote_addr);

    if let Some(preflight) = shared.cors.preflight(&req) {
        return Ok(preflight.into_hyper());
    }

    let origin = req.headers().get(ORIGIN).cloned();
    let path = req.path().to_owned();
    let mut response = match tokio::time::timeout(shared.write_timeout, shared.router.call(req)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(peer = %remote_addr, %path, "handler timed out");
            Response::status(StatusCode::SERVICE_UNAVAILABLE)
        }
    };
    shared.cors.apply(origin.as_ref(), &mut response);

    Ok(response.into_hyper())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// SIGTERM on Unix, Ctrl-C everywhere. A handler that cannot be installed
/// never fires; the other one still does.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("cannot listen for sigterm: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("ctrl-c received"),
        () = terminate => info!("sigterm received"),
    }
}
