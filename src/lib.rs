//! # groundwork
//!
//! The parts every HTTP service in a fleet repeats: a base router with the
//! standard endpoints, a base server with fixed timeouts, CORS and TLS, and a
//! response writer that logs every request exactly the same way.
//!
//! ## The response writer
//!
//! A handler asks its [`BaseHandler`] for a [`ResponseWriter`] bound to the
//! request, produces the response through it, and returns it. Whatever status
//! the writer finalises is logged once, as a `tracing` event inside an
//! `endpoint` span carrying the caller's address, referrer, path, method and
//! start time:
//!
//! - `write_status` / `write_json` / `write_xml` log at `INFO`;
//! - `write_status_with_error`, and any encode failure inside the typed
//!   helpers, log at `WARN` with the error and the reporting call site;
//! - a `404` always carries `X-ServiceFabric: ResourceNotFound`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use groundwork::{BaseHandler, BaseServer, OrEmptyList, Request, RouterConfig, base_router};
//! use http::{Method, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), groundwork::Error> {
//!     let h = BaseHandler::new(tracing::info_span!("users-api"));
//!
//!     let users = h.clone();
//!     let router = base_router(h, env!("CARGO_PKG_VERSION"), RouterConfig::from_file("swagger.yaml")?)?
//!         .on(Method::GET, "/users", move |req: Request| {
//!             let h = users.clone();
//!             async move {
//!                 let mut w = h.writer(&req);
//!                 let names: Option<Vec<String>> = None;
//!                 w.write_json(&OrEmptyList::from(&names), StatusCode::OK);
//!                 w
//!             }
//!         });
//!
//!     BaseServer::new(router, None, "0.0.0.0:8080")?.serve().await
//! }
//! ```

mod base_router;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;
mod writer;

pub mod diagnostics;
pub mod middleware;
pub mod tls;

pub use base_router::{DEFAULT_DEFINITION_PATH, RouterConfig, VERSION_PATH, base_router};
pub use error::Error;
pub use handler::{BaseHandler, Handler};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseSink};
pub use router::Router;
pub use server::{BaseServer, READ_TIMEOUT, WRITE_TIMEOUT};
pub use tls::TlsIdentity;
pub use writer::{CallSite, OrEmptyList, OrEmptyObject, ResponseWriter, WriteError, X_SERVICE_FABRIC, XML_PROLOG};
