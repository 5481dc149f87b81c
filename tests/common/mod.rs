//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use groundwork::ResponseSink;
use http::{HeaderMap, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

// ── Log capture ───────────────────────────────────────────────────────────────

/// One captured event: its level, rendered message, own fields, and the
/// fields of every span it was emitted in.
#[derive(Clone, Debug)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
    pub span_fields: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<Record>>>);

impl Captured {
    pub fn records(&self) -> Vec<Record> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct Fields(BTreeMap<String, String>);

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_owned(), format!("{value:?}"));
    }
}

impl<S> Layer<S> for Captured
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        attrs.record(&mut fields);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(fields);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        let message = fields.0.remove("message").unwrap_or_default();

        let mut span_fields = BTreeMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(f) = span.extensions().get::<Fields>() {
                    span_fields.extend(f.0.clone());
                }
            }
        }

        self.0.lock().unwrap().push(Record {
            level: *event.metadata().level(),
            message,
            fields: fields.0,
            span_fields,
        });
    }
}

/// Runs `f` with a subscriber that records every event, and returns what it
/// returned plus the records.
pub fn capture<T>(f: impl FnOnce() -> T) -> (T, Vec<Record>) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry().with(captured.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, captured.records())
}

/// Installs a recording subscriber on the current thread until the guard
/// drops. For `#[tokio::test]`'s current-thread runtime.
pub fn capturing() -> (Captured, tracing::subscriber::DefaultGuard) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::registry().with(captured.clone());
    (captured, tracing::subscriber::set_default(subscriber))
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// A sink whose body writes always fail, as a dropped connection would.
#[derive(Default)]
pub struct BrokenSink {
    pub headers: HeaderMap,
    pub status: Option<StatusCode>,
}

impl ResponseSink for BrokenSink {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn write_body(&mut self, _buf: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset"))
    }
}

// ── Raw HTTP/1.1 client ───────────────────────────────────────────────────────

/// Sends `request` verbatim over `stream` and returns everything the server
/// wrote back until it closed the connection.
pub async fn roundtrip<S>(mut stream: S, request: &str) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    // A TLS peer may close without close_notify; what was read is enough.
    let _ = stream.read_to_end(&mut raw).await;
    String::from_utf8(raw).unwrap()
}

pub fn get(addr: SocketAddr, path: &str) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n")
}

/// Splits a raw HTTP/1.1 response into status line, lowercase headers and body.
pub fn parse(raw: &str) -> (String, BTreeMap<String, String>, String) {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let mut lines = head.lines();
    let status = lines.next().unwrap().to_owned();
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_owned()))
        .collect();
    (status, headers, body.to_owned())
}
