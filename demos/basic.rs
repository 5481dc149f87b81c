//! Minimal groundwork service: the base endpoints plus a small users API.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/version.json
//!   curl http://localhost:3000/swagger/swagger.yaml
//!   curl http://localhost:3000/debug/runtime
//!   curl http://localhost:3000/users
//!   curl http://localhost:3000/users/42
//!   curl -H 'accept: application/xml' http://localhost:3000/users/42
//!   curl http://localhost:3000/users/0

use groundwork::{BaseHandler, BaseServer, OrEmptyList, Request, ResponseWriter, RouterConfig, base_router, call_site};
use http::header::ACCEPT;
use http::{Method, StatusCode};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const DEFINITION: &[u8] = b"openapi: 3.0.0
info:
  title: users
  version: 0.1.0
paths:
  /users: {}
  /users/{id}: {}
";

#[derive(Serialize)]
struct User {
    id: u32,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), groundwork::Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let h = BaseHandler::new(tracing::info_span!("users-api"));
    let config = RouterConfig::new(DEFINITION).profiler_path("/debug/runtime");

    let (list, show) = (h.clone(), h.clone());
    let router = base_router(h, env!("CARGO_PKG_VERSION"), config)?
        .on(Method::GET, "/users", move |req: Request| {
            let h = list.clone();
            async move { list_users(h.writer(&req)) }
        })
        .on(Method::GET, "/users/{id}", move |req: Request| {
            let h = show.clone();
            async move { get_user(h.writer(&req), &req) }
        });

    BaseServer::new(router, None, "0.0.0.0:3000")?.serve().await
}

// GET /users
//
// No users yet: the absent list still goes out as `[]`.
fn list_users(mut w: ResponseWriter) -> ResponseWriter {
    let users: Option<Vec<User>> = None;
    w.write_json(&OrEmptyList::from(&users), None);
    w
}

// GET /users/{id}
fn get_user(mut w: ResponseWriter, req: &Request) -> ResponseWriter {
    let id = match req.param("id").unwrap_or_default().parse::<u32>() {
        Ok(0) => {
            w.write_status(StatusCode::NOT_FOUND);
            return w;
        }
        Ok(id) => id,
        Err(e) => {
            w.write_status_with_error(StatusCode::BAD_REQUEST, e, call_site!());
            return w;
        }
    };

    let user = User { id, name: "alice".to_owned() };
    if req.header(ACCEPT) == Some("application/xml") {
        w.write_xml(&user, StatusCode::OK);
    } else {
        w.write_json(&user, StatusCode::OK);
    }
    w
}
