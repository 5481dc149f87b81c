//! Radix-tree request router.
//!
//! One tree per HTTP method plus one tree for routes that accept any method.
//! Requests nobody claims are answered through a [`ResponseWriter`](crate::ResponseWriter)
//! so they show up in the logs like every other request.

use std::collections::HashMap;
use std::sync::Arc;

use http::{Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::{BaseHandler, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::Response;

type Params = HashMap<String, String>;

enum Lookup {
    Found(BoxedHandler, Params),
    MethodNotAllowed,
    NotFound,
}

/// The application router.
///
/// Build it once at startup and pass it to [`BaseServer::new`](crate::BaseServer::new).
/// Registration methods take `self` so they chain.
pub struct Router {
    base: BaseHandler,
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    any: MatchitRouter<BoxedHandler>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_handler(BaseHandler::default())
    }

    /// A router whose 404/405 responses are logged through `base`.
    pub fn with_handler(base: BaseHandler) -> Self {
        Self { base, routes: HashMap::new(), any: MatchitRouter::new() }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if the path is malformed or conflicts with an existing route.
    /// Use [`try_on`](Self::try_on) when routes come from configuration.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.try_on(method, path, handler)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Fallible [`on`](Self::on).
    pub fn try_on(mut self, method: Method, path: &str, handler: impl Handler) -> Result<Self, Error> {
        let tree = self.routes.entry(method).or_default();
        insert(tree, path, handler)?;
        Ok(self)
    }

    /// Register a handler for every method on `path`. Method-specific routes
    /// win over these.
    pub fn try_any(mut self, path: &str, handler: impl Handler) -> Result<Self, Error> {
        insert(&mut self.any, path, handler)?;
        Ok(self)
    }

    /// Route one request to its handler and produce its response.
    pub async fn call(&self, mut req: Request) -> Response {
        match self.lookup(req.method(), req.path()) {
            Lookup::Found(handler, params) => {
                req.params = params;
                req.handler = Some(handler.name());
                handler.call(req).await
            }
            Lookup::MethodNotAllowed => self.reject(&req, StatusCode::METHOD_NOT_ALLOWED),
            Lookup::NotFound => self.reject(&req, StatusCode::NOT_FOUND),
        }
    }

    fn reject(&self, req: &Request, status: StatusCode) -> Response {
        let mut w = self.base.writer(req);
        w.write_status(status);
        w.finish()
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let tree = self.routes.get(method);
        if let Some(found) = tree.and_then(|t| matched(t, path)).or_else(|| matched(&self.any, path)) {
            return Lookup::Found(found.0, found.1);
        }

        let elsewhere = self.routes.iter()
            .any(|(m, t)| m != method && t.at(path).is_ok());
        if elsewhere { Lookup::MethodNotAllowed } else { Lookup::NotFound }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn insert(tree: &mut MatchitRouter<BoxedHandler>, path: &str, handler: impl Handler) -> Result<(), Error> {
    tree.insert(path, handler.into_boxed_handler())
        .map_err(|source| Error::Route { path: path.to_owned(), source })
}

fn matched(tree: &MatchitRouter<BoxedHandler>, path: &str) -> Option<(BoxedHandler, Params)> {
    let m = tree.at(path).ok()?;
    let params = m.params.iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
    Some((Arc::clone(m.value), params))
}
