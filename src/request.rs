//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER};
use http::{Method, Uri};

/// An incoming HTTP request with its body fully read.
///
/// The server builds these from hyper requests. Tests and embedders can build
/// them directly and hand them to [`Router::call`](crate::Router::call):
///
/// ```rust
/// use groundwork::Request;
/// use http::{Method, Uri};
///
/// let req = Request::new(Method::GET, Uri::from_static("/version.json"))
///     .with_body("ignored");
/// assert_eq!(req.path(), "/version.json");
/// ```
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) handler: Option<&'static str>,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            remote_addr: None,
            handler: None,
        }
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes, remote_addr: SocketAddr) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params: HashMap::new(),
            remote_addr: Some(remote_addr),
            handler: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Labels the request with the function that will handle it. The router
    /// does this on dispatch.
    pub fn with_handler_name(mut self, name: &'static str) -> Self {
        self.handler = Some(name);
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }
    pub fn handler_name(&self) -> Option<&'static str> { self.handler }

    /// Header value as a string. Non-UTF-8 values read as absent.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `Referer` header, falling back to `Origin`. Empty when neither is set.
    pub fn referrer(&self) -> &str {
        self.header(REFERER)
            .or_else(|| self.header(ORIGIN))
            .unwrap_or("")
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}
