//! The instrumented response writer.
//!
//! [`ResponseWriter`] decorates a [`ResponseSink`] for exactly one request. It
//! remembers who asked (remote address, referrer, path, method) and when, and
//! turns "the status is now final" into exactly one structured `tracing`
//! event:
//!
//! ```text
//! INFO  endpoint{ip=… origin=… uri=/users/7 method=GET executed_start=… type="endpoint"}: /users/7 (200 OK)
//! WARN  endpoint{…}: /users/7 (500 Internal Server Error) -> failed to write response: … func=… file=… line=…
//! ```
//!
//! The typed helpers ([`write_json`](ResponseWriter::write_json),
//! [`write_xml`](ResponseWriter::write_xml)) set the content type, the status,
//! encode the body and log, in that order. An encode failure becomes a `500`
//! with the error attached; it never escapes as a Rust error.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::panic::Location;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use tracing::{Span, info, info_span, warn};

use crate::response::{ContentType, IntoResponse, Response, ResponseSink};

/// Diagnostic header attached to every 404 that passes through a writer.
pub const X_SERVICE_FABRIC: HeaderName = HeaderName::from_static("x-servicefabric");
const RESOURCE_NOT_FOUND: HeaderValue = HeaderValue::from_static("ResourceNotFound");

/// Written ahead of every XML body.
pub const XML_PROLOG: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// `func` reported by typed writes on a writer no handler name was given to.
const UNLABELLED: &str = "<unlabelled handler>";

// ── CallSite ──────────────────────────────────────────────────────────────────

/// Where a failure was reported from. Attached to warning events as the
/// `func`, `file` and `line` fields.
///
/// Build one with [`call_site!`](crate::call_site) at the reporting site, or
/// with [`CallSite::caller`] inside a `#[track_caller]` function.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CallSite {
    pub func: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl CallSite {
    /// The location of whoever called the enclosing `#[track_caller]` function,
    /// labelled with `func`.
    #[track_caller]
    pub fn caller(func: &'static str) -> Self {
        let loc = Location::caller();
        Self { func, file: loc.file(), line: loc.line() }
    }
}

impl CallSite {
    /// Trims closure frames off a `type_name`-style path, leaving the
    /// function that defines them.
    pub fn function_path(mut path: &'static str) -> &'static str {
        while let Some(outer) = path.strip_suffix("::{{closure}}") {
            path = outer;
        }
        path
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.func, self.file, self.line)
    }
}

/// Captures the enclosing function's path, file and line as a [`CallSite`].
///
/// ```rust
/// let site = groundwork::call_site!();
/// assert!(site.func.ends_with("main"));
/// ```
#[macro_export]
macro_rules! call_site {
    () => {{
        fn here() {}
        fn name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let func = name_of(here);
        $crate::CallSite {
            func: $crate::CallSite::function_path(func.strip_suffix("::here").unwrap_or(func)),
            file: file!(),
            line: line!(),
        }
    }};
}

// ── WriteError ────────────────────────────────────────────────────────────────

/// Why a typed write could not complete. Always ends up as a `500`.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("failed to write response: {0}")]
    Encode(#[source] BoxError),

    #[error("failed to write xml header: {0}")]
    XmlHeader(#[source] io::Error),

    #[error("failed to write response: {0}")]
    Io(#[source] io::Error),
}

// ── Empty-container normalisation ─────────────────────────────────────────────

/// A list that may be absent. `None` encodes as `[]`, never `null`.
///
/// ```rust
/// use groundwork::OrEmptyList;
///
/// let missing: Option<Vec<u32>> = None;
/// assert_eq!(serde_json::to_string(&OrEmptyList::from(&missing)).unwrap(), "[]");
/// ```
#[derive(Debug)]
pub struct OrEmptyList<'a, T>(pub Option<&'a [T]>);

impl<'a, T> From<&'a Option<Vec<T>>> for OrEmptyList<'a, T> {
    fn from(list: &'a Option<Vec<T>>) -> Self {
        Self(list.as_deref())
    }
}

impl<T: Serialize> Serialize for OrEmptyList<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(items) => items.serialize(serializer),
            None => serializer.serialize_seq(Some(0))?.end(),
        }
    }
}

/// A record that may be absent. `None` encodes as `{}`, never `null`.
#[derive(Debug)]
pub struct OrEmptyObject<'a, T: ?Sized>(pub Option<&'a T>);

impl<'a, T> From<&'a Option<T>> for OrEmptyObject<'a, T> {
    fn from(value: &'a Option<T>) -> Self {
        Self(value.as_ref())
    }
}

impl<T: Serialize + ?Sized> Serialize for OrEmptyObject<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(value) => value.serialize(serializer),
            None => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

struct Failure {
    error: BoxError,
    site: CallSite,
}

/// Decorates a [`ResponseSink`] with per-request completion logging and typed
/// encoders. One writer per request; never shared.
///
/// Every status-finalising call ([`write_status`](Self::write_status),
/// [`write_status_with_error`](Self::write_status_with_error),
/// [`write_json`](Self::write_json), [`write_xml`](Self::write_xml)) emits one
/// completion event before returning. Calling two of them on the same writer
/// logs twice; that is a handler bug, not something the writer hides.
/// [`finish`](Self::finish) logs once for responses that only ever wrote raw
/// bytes.
pub struct ResponseWriter<S = Response> {
    sink: S,
    span: Span,
    path: String,
    started: Instant,
    status: StatusCode,
    failure: Option<Failure>,
    logged: bool,
    handler: Option<&'static str>,
}

impl<S: ResponseSink> ResponseWriter<S> {
    /// Binds a writer to one request. The completion event is emitted inside
    /// an `endpoint` span, child of `logger`, carrying the request identity.
    pub fn new(
        logger: &Span,
        remote_addr: &str,
        origin: &str,
        path: &str,
        method: &str,
        sink: S,
    ) -> Self {
        let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let span = info_span!(
            parent: logger,
            "endpoint",
            ip = %remote_addr,
            origin = %origin,
            uri = %path,
            method = %method,
            executed_start = %started_at,
            "type" = "endpoint",
        );
        Self {
            sink,
            span,
            path: path.to_owned(),
            started: Instant::now(),
            status: StatusCode::OK,
            failure: None,
            logged: false,
            handler: None,
        }
    }

    /// Names the handler function this writer answers for. Encode failures
    /// inside [`write_json`](Self::write_json) and
    /// [`write_xml`](Self::write_xml) report it as their `func`.
    pub fn labelled(mut self, handler: &'static str) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn handler_name(&self) -> Option<&'static str> { self.handler }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        self.sink.headers_mut()
    }

    /// Writes raw body bytes straight to the sink. Does not log.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write_body(buf)?;
        Ok(buf.len())
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn is_logged(&self) -> bool { self.logged }

    pub fn error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.failure.as_ref().map(|f| f.error.as_ref())
    }

    /// Sets the final status and logs it.
    pub fn write_status(&mut self, status: StatusCode) {
        self.forward_status(status);
        self.log();
    }

    /// Sets the final status, records `err` reported from `site`, and logs a
    /// warning carrying both.
    pub fn write_status_with_error<E>(&mut self, status: StatusCode, err: E, site: CallSite)
    where
        E: Into<BoxError>,
    {
        self.failure = Some(Failure { error: err.into(), site });
        self.forward_status(status);
        self.log();
    }

    /// Sets `Content-Type: application/json`, applies `status` if given, and
    /// encodes `data`. Wrap possibly-absent containers in [`OrEmptyList`] or
    /// [`OrEmptyObject`] to keep `null` out of the body.
    ///
    /// On encode or write failure the response becomes a `500` whose warning
    /// points at the line that called this method, in the function the writer
    /// is [`labelled`](Self::labelled) with.
    #[track_caller]
    pub fn write_json<T>(&mut self, data: &T, status: impl Into<Option<StatusCode>>)
    where
        T: Serialize + ?Sized,
    {
        let site = CallSite::caller(self.handler.unwrap_or(UNLABELLED));
        self.write_json_at(data, status, site);
    }

    /// [`write_json`](Self::write_json) with an explicit failure site, usually
    /// [`call_site!`](crate::call_site).
    pub fn write_json_at<T>(&mut self, data: &T, status: impl Into<Option<StatusCode>>, site: CallSite)
    where
        T: Serialize + ?Sized,
    {
        self.sink.headers_mut().insert(CONTENT_TYPE, ContentType::Json.header_value());
        if let Some(status) = status.into() {
            self.forward_status(status);
        }

        let written = serde_json::to_vec(data)
            .map_err(|e| WriteError::Encode(e.into()))
            .and_then(|body| self.sink.write_body(&body).map_err(WriteError::Io));
        if let Err(err) = written {
            self.write_status_with_error(StatusCode::INTERNAL_SERVER_ERROR, err, site);
            return;
        }
        self.log();
    }

    /// Sets `Content-Type: application/xml`, applies `status` if given, writes
    /// [`XML_PROLOG`] and then the encoded `data`.
    ///
    /// The root element is named after the value's type: `Item` for a struct
    /// `Item`, one `<Item>` per element for a `Vec<Item>` or slice, and the
    /// type itself for scalars (`<u32>5</u32>`, `<string>hi</string>`).
    #[track_caller]
    pub fn write_xml<T>(&mut self, data: &T, status: impl Into<Option<StatusCode>>)
    where
        T: Serialize + ?Sized,
    {
        let site = CallSite::caller(self.handler.unwrap_or(UNLABELLED));
        self.write_xml_at(data, status, site);
    }

    /// [`write_xml`](Self::write_xml) with an explicit failure site.
    pub fn write_xml_at<T>(&mut self, data: &T, status: impl Into<Option<StatusCode>>, site: CallSite)
    where
        T: Serialize + ?Sized,
    {
        self.sink.headers_mut().insert(CONTENT_TYPE, ContentType::Xml.header_value());
        if let Some(status) = status.into() {
            self.forward_status(status);
        }

        if let Err(e) = self.sink.write_body(XML_PROLOG.as_bytes()) {
            self.write_status_with_error(StatusCode::INTERNAL_SERVER_ERROR, WriteError::XmlHeader(e), site);
            return;
        }

        let root = xml_root(std::any::type_name::<T>());
        let written = quick_xml::se::to_string_with_root(root, data)
            .map_err(|e| WriteError::Encode(e.into()))
            .and_then(|body| self.sink.write_body(body.as_bytes()).map_err(WriteError::Io));
        if let Err(err) = written {
            self.write_status_with_error(StatusCode::INTERNAL_SERVER_ERROR, err, site);
            return;
        }
        self.log();
    }

    /// Emits the completion event for the current status.
    pub fn log(&mut self) {
        self.logged = true;
        let code = self.status.as_u16();
        let reason = self.status.canonical_reason().unwrap_or("");
        let elapsed_ms = self.started.elapsed().as_millis() as u64;

        match &self.failure {
            Some(Failure { error, site }) => warn!(
                parent: &self.span,
                func = site.func,
                file = site.file,
                line = site.line,
                status = code,
                elapsed_ms,
                "{} ({code} {reason}) -> {error}",
                self.path,
            ),
            None => info!(
                parent: &self.span,
                status = code,
                elapsed_ms,
                "{} ({code} {reason})",
                self.path,
            ),
        }
    }

    /// Releases the sink, logging first if no status was ever finalised.
    pub fn finish(mut self) -> S {
        if !self.logged {
            self.log();
        }
        self.sink
    }

    fn forward_status(&mut self, status: StatusCode) {
        self.status = status;
        let headers = self.sink.headers_mut();
        if status == StatusCode::NOT_FOUND {
            headers.insert(X_SERVICE_FABRIC, RESOURCE_NOT_FOUND);
        } else {
            headers.remove(X_SERVICE_FABRIC);
        }
        self.sink.write_status(status);
    }
}

// ── XML root naming ──────────────────────────────────────────────────────────

/// Wrappers whose XML form is that of their first type argument.
const TRANSPARENT: [&str; 10] = [
    "Vec", "VecDeque", "BTreeSet", "HashSet", "Option", "Box", "Rc", "Arc", "OrEmptyList", "OrEmptyObject",
];

/// Root element name for a value of the type `type_name` describes.
fn xml_root(type_name: &'static str) -> &'static str {
    let ty = type_name.trim_start_matches('&').trim_start_matches("mut ");

    if let Some(inner) = ty.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        let elem = inner.rsplit_once("; ").map_or(inner, |(elem, _len)| elem);
        return xml_root(elem);
    }

    let (path, args) = match ty.split_once('<') {
        Some((path, rest)) => (path, rest.strip_suffix('>')),
        None => (ty, None),
    };
    let name = path.rsplit("::").next().unwrap_or(path);
    match (name, args) {
        (wrapper, Some(args)) if TRANSPARENT.contains(&wrapper) => xml_root(first_type_arg(args)),
        ("str" | "String", _) => "string",
        _ => name,
    }
}

/// `A` out of `A, B` where either may itself be generic.
fn first_type_arg(args: &'static str) -> &'static str {
    let mut depth = 0usize;
    for (i, c) in args.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return args[..i].trim(),
            _ => {}
        }
    }
    args.trim()
}

impl<S: ResponseSink> io::Write for ResponseWriter<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ResponseWriter::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl IntoResponse for ResponseWriter<Response> {
    fn into_response(self) -> Response {
        self.finish()
    }
}
