//! Cross-cutting request/response policy applied by the server around the
//! router.
//!
//! There is no general middleware chain. Each policy here is a plain value
//! built once in [`BaseServer::new`](crate::BaseServer::new) and consulted by
//! the server's dispatch on every request.

pub mod cors;

pub use cors::Cors;
