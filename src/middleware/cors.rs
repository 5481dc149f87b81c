//! CORS policy.
//!
//! Preflight handling:
//!
//! | Condition | Answer |
//! |---|---|
//! | no `Access-Control-Request-Method` | `400` |
//! | requested method not allowed | `405` |
//! | a requested header not allowed | `403` |
//! | otherwise | `200` with the allow headers |
//!
//! Requests without an `Origin` header are not CORS requests and pass
//! through untouched.

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
    HeaderName, HeaderValue, ORIGIN, VARY,
};
use http::{Method, StatusCode};

use crate::request::Request;
use crate::response::{Response, ResponseSink};

/// Headers a browser may always send; never need to be listed.
const SIMPLE_HEADERS: [&str; 4] = ["accept", "accept-language", "content-language", "origin"];
/// Methods a browser may always use; never echoed back.
const SIMPLE_METHODS: [Method; 3] = [Method::GET, Method::HEAD, Method::POST];

#[derive(Clone, Debug)]
pub struct Cors {
    allow_credentials: bool,
    allowed_methods: Vec<Method>,
    allowed_headers: Vec<HeaderName>,
}

impl Cors {
    /// The fixed policy every base server applies: credentials allowed,
    /// `GET`/`POST`/`PUT`/`DELETE`, and the usual API request headers.
    pub fn base() -> Self {
        Self {
            allow_credentials: true,
            allowed_methods: vec![Method::GET, Method::POST, Method::PUT, Method::DELETE],
            allowed_headers: vec![
                http::header::ACCEPT,
                http::header::CONTENT_TYPE,
                http::header::CONTENT_LENGTH,
                http::header::ACCEPT_ENCODING,
                http::header::AUTHORIZATION,
            ],
        }
    }

    pub fn allow_credentials(&self) -> bool { self.allow_credentials }
    pub fn allowed_methods(&self) -> &[Method] { &self.allowed_methods }
    pub fn allowed_headers(&self) -> &[HeaderName] { &self.allowed_headers }

    /// Answers a preflight request. `None` means `req` is not a preflight and
    /// belongs to the router.
    pub fn preflight(&self, req: &Request) -> Option<Response> {
        if *req.method() != Method::OPTIONS {
            return None;
        }
        let origin = req.headers().get(ORIGIN)?.clone();

        let Some(requested) = req.header(ACCESS_CONTROL_REQUEST_METHOD) else {
            return Some(Response::status(StatusCode::BAD_REQUEST));
        };
        let method = match requested.parse::<Method>() {
            Ok(m) if self.allowed_methods.contains(&m) => m,
            _ => return Some(Response::status(StatusCode::METHOD_NOT_ALLOWED)),
        };

        let mut allowed = Vec::new();
        for name in req.header(ACCESS_CONTROL_REQUEST_HEADERS).unwrap_or("").split(',') {
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() || SIMPLE_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if !self.allowed_headers.iter().any(|h| h.as_str() == name) {
                return Some(Response::status(StatusCode::FORBIDDEN));
            }
            allowed.push(name);
        }

        let mut res = Response::status(StatusCode::OK);
        let headers = res.headers_mut();
        if !allowed.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&allowed.join(",")) {
                headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, value);
            }
        }
        if !SIMPLE_METHODS.contains(&method) {
            if let Ok(value) = HeaderValue::from_str(method.as_str()) {
                headers.insert(ACCESS_CONTROL_ALLOW_METHODS, value);
            }
        }
        self.apply(Some(&origin), &mut res);
        Some(res)
    }

    /// Adds the origin headers to an actual (non-preflight) response.
    ///
    /// With credentials allowed the request origin is echoed; browsers reject
    /// `*` on credentialed requests.
    pub fn apply(&self, origin: Option<&HeaderValue>, res: &mut Response) {
        let Some(origin) = origin else { return };
        let headers = res.headers_mut();
        if self.allow_credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
            headers.append(VARY, HeaderValue::from_static("origin"));
        } else {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Uri;

    fn preflight(method: &'static str, headers: &'static str) -> Request {
        Request::new(Method::OPTIONS, Uri::from_static("/users"))
            .with_header(ORIGIN, HeaderValue::from_static("https://app.example"))
            .with_header(ACCESS_CONTROL_REQUEST_METHOD, HeaderValue::from_static(method))
            .with_header(ACCESS_CONTROL_REQUEST_HEADERS, HeaderValue::from_static(headers))
    }

    #[test]
    fn allowed_preflight_lists_requested_headers() {
        let res = Cors::base().preflight(&preflight("PUT", "Content-Type, Authorization, Accept")).unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_HEADERS], "content-type,authorization");
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_METHODS], "PUT");
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[test]
    fn simple_method_is_not_echoed() {
        let res = Cors::base().preflight(&preflight("GET", "")).unwrap();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_METHODS).is_none());
        assert!(res.headers().get(ACCESS_CONTROL_ALLOW_HEADERS).is_none());
    }

    #[test]
    fn disallowed_method_is_rejected() {
        let res = Cors::base().preflight(&preflight("PATCH", "")).unwrap();
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn disallowed_header_is_forbidden() {
        let res = Cors::base().preflight(&preflight("POST", "X-Custom")).unwrap();
        assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn missing_request_method_is_bad_request() {
        let req = Request::new(Method::OPTIONS, Uri::from_static("/"))
            .with_header(ORIGIN, HeaderValue::from_static("https://app.example"));
        let res = Cors::base().preflight(&req).unwrap();
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn options_without_origin_goes_to_the_router() {
        let req = Request::new(Method::OPTIONS, Uri::from_static("/"));
        assert!(Cors::base().preflight(&req).is_none());
    }

    #[test]
    fn actual_requests_get_origin_headers() {
        let mut res = Response::status(StatusCode::OK);
        let origin = HeaderValue::from_static("https://app.example");
        Cors::base().apply(Some(&origin), &mut res);
        assert_eq!(res.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
        assert_eq!(res.headers()[VARY], "origin");

        let mut res = Response::status(StatusCode::OK);
        Cors::base().apply(None, &mut res);
        assert!(res.headers().is_empty());
    }
}
