//! Route handlers and the [`BaseHandler`] that hands out response writers.
//!
//! The router stores handlers of different types side by side, so each one
//! is boxed behind `dyn ErasedHandler` at registration. The box also keeps the
//! path of the function that defined the handler; the router stamps it on the
//! request and [`BaseHandler::writer`] carries it into the writer.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::Span;

use crate::request::Request;
use crate::response::{IntoResponse, Response, ResponseSink};
use crate::writer::{CallSite, ResponseWriter};

// ── BaseHandler ───────────────────────────────────────────────────────────────

/// Shared dependencies for every handler of a service: today, the logger.
///
/// The logger is a `tracing` span. Put service-wide fields on it once; every
/// request's `endpoint` span is opened as its child.
///
/// ```rust
/// use groundwork::{BaseHandler, Request};
/// use http::{Method, StatusCode, Uri};
///
/// let base = BaseHandler::new(tracing::info_span!("api", service = "users"));
/// let req = Request::new(Method::GET, Uri::from_static("/users/7"));
/// let mut w = base.writer(&req);
/// w.write_status(StatusCode::NO_CONTENT);
/// ```
#[derive(Clone, Debug)]
pub struct BaseHandler {
    logger: Span,
}

impl BaseHandler {
    pub fn new(logger: Span) -> Self {
        Self { logger }
    }

    pub fn logger(&self) -> &Span {
        &self.logger
    }

    /// A fresh writer bound to `req`, buffering into a new [`Response`].
    pub fn writer(&self, req: &Request) -> ResponseWriter {
        self.writer_with(req, Response::new())
    }

    /// A fresh writer bound to `req` that writes into `sink`.
    ///
    /// When the router dispatched `req`, the writer is labelled with the
    /// handler's function so encode failures name it.
    pub fn writer_with<S: ResponseSink>(&self, req: &Request, sink: S) -> ResponseWriter<S> {
        let remote_addr = req.remote_addr().map(|a| a.to_string()).unwrap_or_default();
        let w = ResponseWriter::new(
            &self.logger,
            &remote_addr,
            req.referrer(),
            req.path(),
            req.method().as_str(),
            sink,
        );
        match req.handler_name() {
            Some(name) => w.labelled(name),
            None => w,
        }
    }
}

/// Writers from a default handler open root `endpoint` spans.
impl Default for BaseHandler {
    fn default() -> Self {
        Self::new(Span::none())
    }
}

// ── Erasure ───────────────────────────────────────────────────────────────────

pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// A handler with its concrete type forgotten. Public only because
/// [`Handler::into_boxed_handler`] names it.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;

    /// Path of the function that defines the handler, closures stripped.
    fn name(&self) -> &'static str;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Anything the router accepts as a route handler: a function or closure
/// `Fn(Request) -> impl Future<Output = impl IntoResponse>`.
///
/// Closures are the usual way to hand a handler its [`BaseHandler`]:
///
/// ```rust
/// use groundwork::{BaseHandler, Request, Router};
/// use http::Method;
///
/// let base = BaseHandler::default();
/// let h = base.clone();
/// let router = Router::with_handler(base).on(Method::GET, "/ping", move |req: Request| {
///     let h = h.clone();
///     async move {
///         let mut w = h.writer(&req);
///         w.write_json("pong", None);
///         w
///     }
/// });
/// ```
///
/// Sealed.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        let name = CallSite::function_path(std::any::type_name::<F>());
        Arc::new(Named { name, call: self })
    }
}

struct Named<F> {
    name: &'static str,
    call: F,
}

impl<F, Fut, R> ErasedHandler for Named<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.call)(req);
        Box::pin(async move { fut.await.into_response() })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
