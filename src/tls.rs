//! TLS policy and certificate loading.
//!
//! Every base server that terminates TLS itself uses the same policy:
//!
//! - TLS 1.2 minimum (the lowest rustls speaks);
//! - key exchange on P-384, then P-256;
//! - AES-256-GCM first, the server's suite order wins over the client's.
//!
//! Behind a terminating proxy, pass no identity to
//! [`BaseServer::new`](crate::BaseServer::new) and none of this applies.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};

use crate::error::Error;

pub static PROTOCOL_VERSIONS: &[&SupportedProtocolVersion] = &[&rustls::version::TLS13, &rustls::version::TLS12];

/// Cipher suites in preference order. TLS 1.2 is limited to ECDHE-RSA with
/// AES-256-GCM.
pub fn cipher_suites() -> Vec<SupportedCipherSuite> {
    vec![
        ring::cipher_suite::TLS13_AES_256_GCM_SHA384,
        ring::cipher_suite::TLS13_AES_128_GCM_SHA256,
        ring::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
    ]
}

/// A certificate chain and its private key.
#[derive(Debug)]
pub struct TlsIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    pub fn new(cert_chain: Vec<CertificateDer<'static>>, key: PrivateKeyDer<'static>) -> Self {
        Self { cert_chain, key }
    }

    /// Parses a PEM certificate chain and the first PEM private key found.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, Error> {
        let cert_chain = rustls_pemfile::certs(&mut &*cert_pem).collect::<Result<Vec<_>, _>>()?;
        let key = rustls_pemfile::private_key(&mut &*key_pem)?.ok_or(Error::MissingPrivateKey)?;
        Ok(Self::new(cert_chain, key))
    }

    pub fn from_pem_files(cert_path: impl AsRef<Path>, key_path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_pem(&fs::read(cert_path)?, &fs::read(key_path)?)
    }
}

/// The ring provider cut down to the policy's suites and key-exchange groups.
pub fn provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: cipher_suites(),
        kx_groups: vec![ring::kx_group::SECP384R1, ring::kx_group::SECP256R1],
        ..ring::default_provider()
    }
}

/// Builds the server-side TLS config for `identity` under the fixed policy.
pub fn server_config(identity: TlsIdentity) -> Result<Arc<ServerConfig>, Error> {
    let mut config = ServerConfig::builder_with_provider(Arc::new(provider()))
        .with_protocol_versions(PROTOCOL_VERSIONS)?
        .with_no_client_auth()
        .with_single_cert(identity.cert_chain, identity.key)?;
    config.ignore_client_order = true;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}
