//! Unified error type.

use std::net::AddrParseError;

/// The error type returned by groundwork's fallible constructors.
///
/// Per-request failures never surface here: the [`ResponseWriter`](crate::ResponseWriter)
/// turns them into a `500` response plus a warning event. This type covers
/// assembly-time problems (unreadable API definition, bad routes, TLS material)
/// and infrastructure failures such as binding a port.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read api definition: {0}")]
    ApiDefinition(#[source] std::io::Error),

    #[error("some {0} config fields are not populated")]
    IncompleteConfig(&'static str),

    #[error("invalid content type `{value}`: {source}")]
    ContentType {
        value: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },

    #[error("invalid route `{path}`: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },

    #[error("invalid listen address `{addr}`: {source}")]
    Address {
        addr: String,
        #[source]
        source: AddrParseError,
    },

    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    #[error("tls: no private key found in pem input")]
    MissingPrivateKey,

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}
