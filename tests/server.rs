mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use groundwork::{BaseHandler, BaseServer, Error, Request, Router, RouterConfig, TlsIdentity, base_router};
use http::{Method, StatusCode};
use rustls::pki_types::ServerName;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use common::{get, parse, roundtrip};

const DEFINITION: &[u8] = b"openapi: 3.0.0\n";

#[derive(Serialize)]
struct Item {
    id: String,
}

fn app() -> Router {
    let h = BaseHandler::default();
    let items = h.clone();
    base_router(h, "4.5.6", RouterConfig::new(DEFINITION))
        .unwrap()
        .on(Method::GET, "/items/{id}", move |req: Request| {
            let h = items.clone();
            async move {
                let mut w = h.writer(&req);
                let id = req.param("id").unwrap_or_default().to_owned();
                w.write_json(&Item { id }, StatusCode::OK);
                w
            }
        })
}

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), Error>>,
}

impl Running {
    async fn shutdown(self) {
        self.stop.send(()).unwrap();
        self.task.await.unwrap().unwrap();
    }
}

async fn start(identity: Option<TlsIdentity>) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = BaseServer::new(app(), identity, &addr.to_string()).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve_with_shutdown(listener, async {
        let _ = stopped.await;
    }));
    Running { addr, stop, task }
}

#[tokio::test]
async fn serves_the_base_endpoints_over_plain_tcp() {
    let server = start(None).await;

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let raw = roundtrip(stream, &get(server.addr, "/version.json")).await;
    let (status, headers, body) = parse(&raw);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(body, r#"{"version":"4.5.6"}"#);

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let raw = roundtrip(stream, &get(server.addr, "/items/42")).await;
    let (status, _, body) = parse(&raw);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, r#"{"id":"42"}"#);

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let raw = roundtrip(stream, &get(server.addr, "/nowhere")).await;
    let (status, headers, _) = parse(&raw);
    assert_eq!(status, "HTTP/1.1 404 Not Found");
    assert_eq!(headers["x-servicefabric"], "ResourceNotFound");

    server.shutdown().await;
}

#[tokio::test]
async fn actual_requests_echo_the_origin_with_credentials() {
    let server = start(None).await;

    let request = format!(
        "GET /version.json HTTP/1.1\r\nHost: {}\r\nOrigin: https://app.example\r\nConnection: close\r\n\r\n",
        server.addr
    );
    let raw = roundtrip(TcpStream::connect(server.addr).await.unwrap(), &request).await;
    let (status, headers, _) = parse(&raw);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(headers["access-control-allow-origin"], "https://app.example");
    assert_eq!(headers["access-control-allow-credentials"], "true");

    server.shutdown().await;
}

#[tokio::test]
async fn preflight_is_answered_before_routing() {
    let server = start(None).await;

    let allowed = format!(
        "OPTIONS /items/1 HTTP/1.1\r\nHost: {}\r\nOrigin: https://app.example\r\n\
         Access-Control-Request-Method: PUT\r\nAccess-Control-Request-Headers: Content-Type\r\n\
         Connection: close\r\n\r\n",
        server.addr
    );
    let raw = roundtrip(TcpStream::connect(server.addr).await.unwrap(), &allowed).await;
    let (status, headers, _) = parse(&raw);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(headers["access-control-allow-methods"], "PUT");
    assert_eq!(headers["access-control-allow-headers"], "content-type");
    assert_eq!(headers["access-control-allow-origin"], "https://app.example");

    let refused = format!(
        "OPTIONS /items/1 HTTP/1.1\r\nHost: {}\r\nOrigin: https://app.example\r\n\
         Access-Control-Request-Method: PATCH\r\nConnection: close\r\n\r\n",
        server.addr
    );
    let raw = roundtrip(TcpStream::connect(server.addr).await.unwrap(), &refused).await;
    let (status, _, _) = parse(&raw);
    assert_eq!(status, "HTTP/1.1 405 Method Not Allowed");

    server.shutdown().await;
}

#[tokio::test]
async fn serves_over_tls_with_the_fixed_policy() {
    let cert = rcgen::generate_simple_self_signed(["localhost".to_owned()]).unwrap();
    let identity = TlsIdentity::from_pem(cert.cert.pem().as_bytes(), cert.signing_key.serialize_pem().as_bytes())
        .unwrap();
    let server = start(Some(identity)).await;

    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert.cert.der().clone()).unwrap();
    let client = rustls::ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(client));

    let tcp = TcpStream::connect(server.addr).await.unwrap();
    let stream = connector
        .connect(ServerName::try_from("localhost").unwrap(), tcp)
        .await
        .unwrap();
    assert_eq!(stream.get_ref().1.protocol_version(), Some(rustls::ProtocolVersion::TLSv1_3));
    assert_eq!(
        stream.get_ref().1.negotiated_cipher_suite().map(|s| s.suite()),
        Some(rustls::CipherSuite::TLS13_AES_256_GCM_SHA384),
    );

    let raw = roundtrip(stream, &get(server.addr, "/version.json")).await;
    let (status, _, body) = parse(&raw);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, r#"{"version":"4.5.6"}"#);

    server.shutdown().await;
}

#[tokio::test]
async fn plain_clients_are_refused_by_a_tls_server() {
    let cert = rcgen::generate_simple_self_signed(["localhost".to_owned()]).unwrap();
    let identity = TlsIdentity::from_pem(cert.cert.pem().as_bytes(), cert.signing_key.serialize_pem().as_bytes())
        .unwrap();
    let server = start(Some(identity)).await;

    let raw = {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let mut tcp = TcpStream::connect(server.addr).await.unwrap();
        tcp.write_all(get(server.addr, "/version.json").as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        let _ = tcp.read_to_end(&mut raw).await;
        raw
    };
    assert!(!raw.starts_with(b"HTTP/1.1"));

    server.shutdown().await;
}

#[tokio::test]
async fn shutdown_returns_once_the_signal_fires() {
    let server = start(None).await;
    server.shutdown().await;
}
