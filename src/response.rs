//! Outgoing HTTP response, the [`ResponseSink`] seam and [`IntoResponse`].
//!
//! [`Response`] is a buffered sink: status, headers and body accumulate in
//! memory while the handler runs and are handed to hyper once it returns.
//! Because nothing reaches the wire before that point, the last status
//! written wins. That is what lets an encode failure late in a handler still
//! turn into a clean `500`.

use std::io;

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values the typed writers and built-in handlers emit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Json,  // application/json
    Text,  // text/plain; charset=utf-8
    Xml,   // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Text => "text/plain; charset=utf-8",
            Self::Xml  => "application/xml",
        }
    }

    pub(crate) fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── ResponseSink ─────────────────────────────────────────────────────────────

/// The raw mechanism for sending one request's status, headers and body.
///
/// [`ResponseWriter`](crate::ResponseWriter) decorates any sink. It never reads
/// back from it.
pub trait ResponseSink {
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Forwards the status line.
    fn write_status(&mut self, status: StatusCode);

    /// Writes every byte of `buf` or fails.
    fn write_body(&mut self, buf: &[u8]) -> io::Result<()>;
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response. Defaults to `200 OK` with no headers and no body.
#[derive(Debug, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, ..Self::default() }
    }

    /// `text/plain; charset=utf-8` with the given status.
    pub fn text(code: StatusCode, body: impl Into<String>) -> Self {
        let mut res = Self::status(code);
        res.headers.insert(CONTENT_TYPE, ContentType::Text.header_value());
        res.body.extend_from_slice(body.into().as_bytes());
        res
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub(crate) fn into_hyper(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseSink for Response {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn write_body(&mut self, buf: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(buf);
        Ok(())
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`].
///
/// Handlers return anything implementing this. The usual return value is the
/// handler's [`ResponseWriter`](crate::ResponseWriter), which logs its
/// completion record (if it has not already) on the way out.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

/// Return a bare status from a handler: `return StatusCode::NO_CONTENT`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}
