//! Leaf-certificate capture probe.
//!
//! Connects to the target host over TLS with verification disabled, for
//! this probe alone, records the peer's leaf certificate, and performs a
//! minimal HEAD exchange so the peer sees a complete request. The leaf is
//! all that matters here; the response is parsed only for logging.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rustls::pki_types::{CertificateDer, ServerName};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;

use crate::config::{AIA_PROBE_CONNECT_TIMEOUT, AIA_PROBE_TOTAL_TIMEOUT};
use crate::response::HttpResponse;
use crate::url::Url;

/// Accepts any certificate. Used only by the leaf-capture probe, which
/// must succeed precisely when ordinary verification cannot.
#[derive(Debug)]
struct AcceptAllVerifier;

impl rustls::client::danger::ServerCertVerifier for AcceptAllVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}

/// Splits `host[:port]` into a host name and port, defaulting to 443.
/// Bracketed IPv6 literals keep their brackets stripped for connection.
pub(crate) fn host_and_port(url: &Url) -> (String, u16) {
    let raw = url.host();
    if let Some(end) = raw.strip_prefix('[').and_then(|r| r.find(']')) {
        let host = raw[1..=end].to_string();
        let port = raw[end + 2..]
            .strip_prefix(':')
            .and_then(|p| p.parse().ok())
            .unwrap_or(443);
        return (host, port);
    }
    match raw.rsplit_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(443)),
        None => (raw.to_string(), 443),
    }
}

/// Fetches the DER leaf certificate presented by the peer for `url`.
pub async fn fetch_leaf_certificate(url: &Url) -> Result<Vec<u8>> {
    let (host, port) = host_and_port(url);

    let config = ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAllVerifier))
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.clone())
        .map_err(|e| anyhow!("invalid server name {host}: {e}"))?;

    let sock = tokio::time::timeout(
        AIA_PROBE_CONNECT_TIMEOUT,
        TcpStream::connect((host.as_str(), port)),
    )
    .await
    .map_err(|_| anyhow!("connect timeout for {host}:{port}"))?
    .with_context(|| format!("connecting to {host}:{port}"))?;

    let connector = TlsConnector::from(Arc::new(config));
    let mut stream = tokio::time::timeout(AIA_PROBE_TOTAL_TIMEOUT, connector.connect(server_name, sock))
        .await
        .map_err(|_| anyhow!("TLS handshake timeout for {host}"))?
        .with_context(|| format!("TLS handshake with {host}"))?;

    let leaf = stream
        .get_ref()
        .1
        .peer_certificates()
        .and_then(|certs| certs.first())
        .map(|cert| cert.as_ref().to_vec())
        .ok_or_else(|| anyhow!("peer {host} presented no certificate"))?;

    // Complete a polite exchange; failures past this point are harmless.
    let path = if url.path().is_empty() { "/" } else { url.path() };
    let request = format!(
        "HEAD {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\nAccept-Encoding: identity\r\n\r\n"
    );
    if stream.write_all(request.as_bytes()).await.is_ok() {
        let mut buf = vec![0u8; 4096];
        if let Ok(Ok(n)) =
            tokio::time::timeout(AIA_PROBE_TOTAL_TIMEOUT, stream.read(&mut buf)).await
        {
            let mut head = HttpResponse::new();
            for line in String::from_utf8_lossy(&buf[..n]).lines() {
                if line.is_empty() {
                    break;
                }
                head.add_header_line(line);
            }
            log::debug!(
                "probe {host}: leaf captured, server={}",
                head.header("server").unwrap_or("?")
            );
        }
    }

    Ok(leaf)
}
