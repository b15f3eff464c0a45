//! Byte streams a connection can run over.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

#[cfg(feature = "tls")]
use std::sync::Arc;

#[cfg(feature = "tls")]
use rustls::pki_types::ServerName;
#[cfg(feature = "tls")]
use tokio_rustls::TlsConnector;
#[cfg(feature = "tls")]
use tokio_rustls::client::TlsStream;

use crate::{Config, Error, Result};

/// Any transport a connection can drive: TCP, a test double, a proxy tunnel.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Io for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed raw transport.
pub type BoxedIo = Box<dyn Io>;

/// A stream that can be either plaintext or TLS.
pub enum MailStream {
    /// Plaintext stream.
    Plain(BoxedIo),
    /// TLS-encrypted stream (boxed to reduce enum size).
    #[cfg(feature = "tls")]
    Tls(Box<TlsStream<BoxedIo>>),
}

impl std::fmt::Debug for MailStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("MailStream::Plain"),
            #[cfg(feature = "tls")]
            Self::Tls(_) => f.write_str("MailStream::Tls"),
        }
    }
}

impl MailStream {
    /// Wraps a raw transport as a plaintext stream.
    pub fn plain(stream: impl Io + 'static) -> Self {
        Self::Plain(Box::new(stream))
    }

    /// Returns true if the stream is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        match self {
            Self::Plain(_) => false,
            #[cfg(feature = "tls")]
            Self::Tls(_) => true,
        }
    }

    /// Performs a TLS handshake over a plaintext stream.
    #[cfg(feature = "tls")]
    pub async fn upgrade_to_tls(self, config: &Config) -> Result<Self> {
        match self {
            Self::Plain(raw) => {
                let connector = create_tls_connector(config);
                let server_name = ServerName::try_from(config.host.clone())
                    .map_err(|e| Error::TlsNegotiation(format!("invalid server name: {e}")))?;
                let tls = connector
                    .connect(server_name, raw)
                    .await
                    .map_err(|e| Error::TlsNegotiation(e.to_string()))?;
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::TlsNegotiation("stream is already TLS".into())),
        }
    }

    /// Without TLS support there is nothing to upgrade to.
    #[cfg(not(feature = "tls"))]
    pub async fn upgrade_to_tls(self, config: &Config) -> Result<Self> {
        drop(self);
        Err(Error::UnsupportedTransport(config.security))
    }
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(feature = "tls")]
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector from the configured rustls settings, falling back
/// to the webpki root store.
#[cfg(feature = "tls")]
#[must_use]
pub fn create_tls_connector(config: &Config) -> TlsConnector {
    if let Some(tls) = &config.tls {
        return TlsConnector::from(Arc::clone(tls));
    }

    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let client_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(client_config))
}

/// Opens a TCP stream to `host:port` within the configured timeout.
pub async fn open_tcp(config: &Config) -> Result<TcpStream> {
    let connect_failed = |reason: String| Error::ConnectFailed {
        host: config.host.clone(),
        port: config.port,
        reason,
    };

    let stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((config.host.as_str(), config.port)),
    )
    .await
    .map_err(|_| connect_failed(format!("timed out after {}", fmt_duration(config.connect_timeout))))?
    .map_err(|e| connect_failed(e.to_string()))?;

    stream.set_nodelay(true).ok();
    Ok(stream)
}

fn fmt_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::Security;

    #[test]
    fn test_plain_is_not_tls() {
        let (client, _server) = tokio::io::duplex(64);
        assert!(!MailStream::plain(client).is_tls());
    }

    #[test]
    fn test_fmt_duration() {
        assert_eq!(fmt_duration(Duration::from_millis(1500)), "1.5s");
    }

    #[tokio::test]
    async fn test_open_tcp_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = Config::new("127.0.0.1", port, Security::None).unwrap();
        let err = open_tcp(&config).await.unwrap_err();
        match err {
            Error::ConnectFailed { host, port: p, .. } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(p, port);
            }
            other => panic!("expected ConnectFailed, got {other:?}"),
        }
    }

    #[cfg(feature = "tls")]
    #[tokio::test]
    async fn test_upgrade_rejects_garbage_handshake() {
        use tokio::io::AsyncWriteExt;

        let (client, mut server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let _ = server.write_all(b"-ERR this is not TLS\r\n").await;
        });

        let config = Config::new("localhost", 110, Security::StartTls).unwrap();
        let err = MailStream::plain(client)
            .upgrade_to_tls(&config)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TlsNegotiation(_)));
    }
}
