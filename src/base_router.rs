//! The base router: standard endpoints every service exposes.
//!
//! | Path | Serves |
//! |---|---|
//! | `definition_path` (default `/swagger/swagger.yaml`) | the API-definition document, verbatim |
//! | `/version.json` | `{"version":"<service version>"}` |
//! | `profiler_path` (optional) | runtime diagnostics, any method |
//!
//! Service routes are chained onto the returned [`Router`].

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::diagnostics::RuntimeReport;
use crate::error::Error;
use crate::handler::BaseHandler;
use crate::request::Request;
use crate::response::{ContentType, ResponseSink};
use crate::writer::ResponseWriter;
use crate::router::Router;

pub const DEFAULT_DEFINITION_PATH: &str = "/swagger/swagger.yaml";
pub const VERSION_PATH: &str = "/version.json";

/// What [`base_router`] needs besides the handler and version.
pub struct RouterConfig<R> {
    /// Readable source of the API-definition document. Read once, at startup.
    pub api_definition: R,
    pub definition_path: String,
    /// Sent with the document when set. Nothing is forced otherwise.
    pub definition_content_type: Option<String>,
    /// Mount point for the diagnostics endpoint. `None` or empty disables it.
    pub profiler_path: Option<String>,
}

impl<R: Read> RouterConfig<R> {
    /// Publishes `api_definition` at [`DEFAULT_DEFINITION_PATH`], no profiler.
    pub fn new(api_definition: R) -> Self {
        Self {
            api_definition,
            definition_path: DEFAULT_DEFINITION_PATH.to_owned(),
            definition_content_type: None,
            profiler_path: None,
        }
    }

    pub fn definition_path(mut self, path: impl Into<String>) -> Self {
        self.definition_path = path.into();
        self
    }

    pub fn definition_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.definition_content_type = Some(content_type.into());
        self
    }

    pub fn profiler_path(mut self, path: impl Into<String>) -> Self {
        self.profiler_path = Some(path.into());
        self
    }
}

impl RouterConfig<File> {
    /// Opens the document at `path`. Failure is reported as
    /// [`Error::ApiDefinition`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = File::open(path).map_err(Error::ApiDefinition)?;
        Ok(Self::new(file))
    }
}

#[derive(Serialize)]
struct VersionBody<'a> {
    version: &'a str,
}

/// Builds a [`Router`] with the standard endpoints registered.
///
/// Fails, without registering anything, when the config is incomplete or the
/// API-definition source cannot be read.
pub fn base_router<R: Read>(
    h: BaseHandler,
    service_version: &str,
    mut config: RouterConfig<R>,
) -> Result<Router, Error> {
    if service_version.is_empty() || !config.definition_path.starts_with('/') {
        return Err(Error::IncompleteConfig("router"));
    }
    let content_type = config.definition_content_type
        .map(|value| match HeaderValue::from_str(&value) {
            Ok(header) => Ok(header),
            Err(source) => Err(Error::ContentType { value, source }),
        })
        .transpose()?;

    let mut definition = Vec::new();
    config.api_definition
        .read_to_end(&mut definition)
        .map_err(Error::ApiDefinition)?;
    let definition = Bytes::from(definition);
    debug!(path = %config.definition_path, bytes = definition.len(), "api definition loaded");

    let version_body = Bytes::from(serde_json::to_vec(&VersionBody { version: service_version })?);

    let base = h.clone();
    let mut router = Router::with_handler(h.clone())
        .try_on(Method::GET, &config.definition_path, move |req: Request| {
            let h = base.clone();
            let definition = definition.clone();
            let content_type = content_type.clone();
            async move {
                let mut w = h.writer(&req);
                write_document(&mut w, content_type, &definition);
                w
            }
        })?;

    let base = h.clone();
    router = router.try_on(Method::GET, VERSION_PATH, move |req: Request| {
        let h = base.clone();
        let body = version_body.clone();
        async move {
            let mut w = h.writer(&req);
            write_document(&mut w, Some(ContentType::Json.header_value()), &body);
            w
        }
    })?;

    if let Some(path) = config.profiler_path.filter(|p| !p.is_empty()) {
        let started = Instant::now();
        router = router.try_any(&path, move |req: Request| {
            let h = h.clone();
            async move {
                let mut w = h.writer(&req);
                w.write_json(&RuntimeReport::capture(started), None);
                w
            }
        })?;
        debug!(%path, "diagnostics endpoint mounted");
    }

    Ok(router)
}

/// Streams a precomputed document. A failed write turns the response into a
/// `500`.
fn write_document<S: ResponseSink>(w: &mut ResponseWriter<S>, content_type: Option<HeaderValue>, body: &[u8]) {
    if let Some(ct) = content_type {
        w.headers_mut().insert(CONTENT_TYPE, ct);
    }
    if let Err(e) = w.write_all(body) {
        w.write_status_with_error(StatusCode::INTERNAL_SERVER_ERROR, e, crate::call_site!());
    }
}
