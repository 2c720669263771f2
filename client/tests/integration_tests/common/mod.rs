//! Common test utilities for integration tests.
//!
//! Provides a fake ingestion endpoint that records every request it gets,
//! a TLS endpoint backed by a throwaway CA, plus helpers for addresses that
//! refuse connections, break TLS, or cut a response short.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::any;
use axum::Router;
use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair, SanType,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// A request as seen by the fake endpoint.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Clone)]
struct EndpointState {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
    captured: Arc<Mutex<Vec<Captured>>>,
}

/// A running fake ingestion endpoint.
pub struct FakeEndpoint {
    /// Base URL, without the ingestion path.
    pub base_url: String,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl FakeEndpoint {
    /// Starts an endpoint answering every request with `status` and `body`.
    pub async fn start(status: StatusCode, body: &'static str) -> Self {
        Self::start_with_delay(status, body, Duration::ZERO).await
    }

    /// Starts an endpoint that waits `delay` before answering.
    pub async fn start_with_delay(status: StatusCode, body: &'static str, delay: Duration) -> Self {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let state = EndpointState {
            status,
            body,
            delay,
            captured: Arc::clone(&captured),
        };
        let app = Router::new()
            .route("/publish/metrics", any(handle))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            captured,
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }
}

async fn handle(
    State(state): State<EndpointState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    state.captured.lock().unwrap().push(Captured {
        method,
        headers,
        body: body.to_vec(),
    });
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    (state.status, state.body)
}

/// A base URL nobody is listening on.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// An `https` base URL served by a plain-text peer, so the handshake fails.
pub async fn plain_text_tls_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut hello = [0u8; 1024];
            let _ = socket.read(&mut hello).await;
            let _ = socket
                .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                .await;
            let _ = socket.shutdown().await;
        }
    });
    format!("https://{addr}")
}

/// An endpoint that answers `status_line` with a `Content-Length` of 100 but
/// sends only a few body bytes before closing.
pub async fn truncated_response_url(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let _ = read_request(&mut socket).await;
            let response = format!("HTTP/1.1 {status_line}\r\nContent-Length: 100\r\n\r\nshort");
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}")
}

/// Method and body of a request read off a raw stream.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: String,
    pub body: Vec<u8>,
}

/// Reads one HTTP/1.1 request, honouring `Content-Length`.
async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> Option<RawRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let method = head.split_whitespace().next()?.to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Some(RawRequest {
        method,
        body: buf[header_end..header_end + content_length].to_vec(),
    })
}

static MATERIAL_DIRS: AtomicUsize = AtomicUsize::new(0);

/// A throwaway CA with a server certificate for `127.0.0.1` and a client
/// certificate, all written to a scratch directory as PEM.
pub struct TlsMaterial {
    /// CA certificate.
    pub ca: PathBuf,
    /// Client certificate signed by the CA.
    pub client_cert: PathBuf,
    /// Client private key.
    pub client_key: PathBuf,
    ca_der: CertificateDer<'static>,
    server_cert: CertificateDer<'static>,
    server_key: Vec<u8>,
    dir: PathBuf,
}

impl TlsMaterial {
    /// Generates fresh material.
    pub fn generate() -> Self {
        let mut ca_params = CertificateParams::default();
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "pushprobe test CA");
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_key = KeyPair::generate().unwrap();
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let mut server_params = CertificateParams::default();
        server_params
            .distinguished_name
            .push(DnType::CommonName, "127.0.0.1");
        server_params.subject_alt_names =
            vec![SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST))];
        server_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let server_key = KeyPair::generate().unwrap();
        let server_cert = server_params
            .signed_by(&server_key, &ca_cert, &ca_key)
            .unwrap();

        let mut client_params = CertificateParams::default();
        client_params
            .distinguished_name
            .push(DnType::CommonName, "pushprobe client");
        client_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
        let client_key = KeyPair::generate().unwrap();
        let client_cert = client_params
            .signed_by(&client_key, &ca_cert, &ca_key)
            .unwrap();

        let dir = std::env::temp_dir().join(format!(
            "pushprobe-tls-{}-{}",
            std::process::id(),
            MATERIAL_DIRS.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let write = |name: &str, pem: String| {
            let path = dir.join(name);
            std::fs::write(&path, pem).unwrap();
            path
        };

        Self {
            ca: write("ca.crt", ca_cert.pem()),
            client_cert: write("client.crt", client_cert.pem()),
            client_key: write("client.key", client_key.serialize_pem()),
            ca_der: ca_cert.der().clone(),
            server_cert: server_cert.der().clone(),
            server_key: server_key.serialize_der(),
            dir,
        }
    }

    fn server_config(&self) -> ServerConfig {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut roots = RootCertStore::empty();
        roots.add(self.ca_der.clone()).unwrap();
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider))
                .allow_unauthenticated()
                .build()
                .unwrap();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.server_key.clone()));

        ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_client_cert_verifier(verifier)
            .with_single_cert(vec![self.server_cert.clone()], key)
            .unwrap()
    }
}

impl Drop for TlsMaterial {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.dir).ok();
    }
}

/// One completed TLS exchange.
#[derive(Debug, Clone)]
pub struct TlsExchange {
    /// The client sent a certificate the server verified.
    pub client_cert_presented: bool,
    pub request: RawRequest,
}

/// A fake ingestion endpoint behind TLS, answering 200 to every request.
pub struct TlsEndpoint {
    /// Base URL, without the ingestion path.
    pub base_url: String,
    exchanges: Arc<Mutex<Vec<TlsExchange>>>,
}

impl TlsEndpoint {
    /// Starts an endpoint serving the server certificate from `material`.
    pub async fn start(material: &TlsMaterial) -> Self {
        let acceptor = TlsAcceptor::from(Arc::new(material.server_config()));
        let exchanges = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let seen = Arc::clone(&exchanges);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let Ok(mut stream) = acceptor.accept(socket).await else {
                        return;
                    };
                    let client_cert_presented = stream
                        .get_ref()
                        .1
                        .peer_certificates()
                        .is_some_and(|certs| !certs.is_empty());
                    let Some(request) = read_request(&mut stream).await else {
                        return;
                    };
                    seen.lock().unwrap().push(TlsExchange {
                        client_cert_presented,
                        request,
                    });
                    let response = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
                    let _ = stream.write_all(response).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("https://{addr}"),
            exchanges,
        }
    }

    /// Exchanges completed so far.
    pub fn exchanges(&self) -> Vec<TlsExchange> {
        self.exchanges.lock().unwrap().clone()
    }
}
