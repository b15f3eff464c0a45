//! Scripted loopback server for integration tests.
//!
//! The server accepts one connection on `127.0.0.1:0` and plays a fixed
//! script: it sends lines, asserts the lines the client writes, and can
//! switch the socket to TLS with a self-signed `rcgen` certificate.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One step of the server's side of the conversation.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Write these bytes verbatim.
    Send(&'static str),
    /// Read one line and assert it equals this (without CRLF).
    Expect(&'static str),
    /// Run the server side of a TLS handshake.
    Tls,
}

trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Socket for T {}

/// A loopback server running one script.
pub struct StubServer {
    port: u16,
    client_tls: Arc<rustls::ClientConfig>,
    handle: JoinHandle<Vec<String>>,
}

impl StubServer {
    /// Binds, generates a certificate, and spawns the script.
    pub async fn start(script: Vec<Step>) -> Self {
        init_logging();
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let server_tls = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der.clone()], key_der.into())
            .expect("build server TLS config");
        let acceptor = TlsAcceptor::from(Arc::new(server_tls));

        let mut roots = rustls::RootCertStore::empty();
        roots.add(cert_der).expect("trust self-signed cert");
        let client_tls = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let handle = tokio::spawn(async move {
            let (stream, _addr) = listener.accept().await.expect("accept");
            play(Box::new(stream), acceptor, script).await
        });

        Self {
            port,
            client_tls: Arc::new(client_tls),
            handle,
        }
    }

    /// The port the server is listening on.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// A client TLS configuration that trusts the server certificate.
    pub fn client_tls(&self) -> Arc<rustls::ClientConfig> {
        Arc::clone(&self.client_tls)
    }

    /// Waits for the script to finish and returns every line received.
    ///
    /// Panics if the client deviated from the script.
    pub async fn finish(self) -> Vec<String> {
        self.handle.await.expect("script failed")
    }
}

/// Routes client logs to the test output; `RUST_LOG` overrides the filter.
fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// `mailwire_net` plus the crate under test, both at debug.
fn default_filter() -> String {
    let package = env!("CARGO_PKG_NAME").replace('-', "_");
    format!("mailwire_net=debug,{package}=debug")
}

async fn play(stream: Box<dyn Socket>, acceptor: TlsAcceptor, script: Vec<Step>) -> Vec<String> {
    let mut reader = BufReader::new(stream);
    let mut received = Vec::new();

    for step in script {
        match step {
            Step::Send(text) => {
                reader.get_mut().write_all(text.as_bytes()).await.unwrap();
                reader.get_mut().flush().await.unwrap();
            }
            Step::Expect(expected) => {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                assert_eq!(line, expected, "unexpected client line");
                received.push(line);
            }
            Step::Tls => {
                let tcp = reader.into_inner();
                let tls: Box<dyn Socket> =
                    Box::new(acceptor.accept(tcp).await.expect("TLS handshake"));
                reader = BufReader::new(tls);
            }
        }
    }

    received
}
