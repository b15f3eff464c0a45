//! Line-framed connection to a mail server.
//!
//! Both mail protocols are CRLF-terminated text protocols: the client writes
//! one command line, the server answers with one or more lines. This module
//! owns the transport and provides exactly those primitives:
//!
//! - open the transport (plain or TLS) and validate the greeting
//! - read one line, tolerating partial reads
//! - write one line
//! - upgrade the transport to TLS in place (STARTTLS / STLS)
//! - close, idempotently
//!
//! Any read or write failure drops the transport, so later calls fail fast
//! with [`Error::NotConnected`] instead of hanging.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::Span;

use crate::stream::{BoxedIo, Io, MailStream, open_tcp};
use crate::{Config, Error, Result, Security};

/// The two-byte line terminator.
pub const CRLF: &str = "\r\n";

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// A single request/response connection.
///
/// Holds at most one transport. Dropping the connection releases it.
pub struct Connection {
    config: Config,
    stream: Option<BufReader<MailStream>>,
    span: Span,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("security", &self.config.security)
            .field("connected", &self.is_connected())
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}

impl Connection {
    /// Creates an unopened connection.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let span = tracing::info_span!("connection", host = %config.host, port = config.port);
        Self {
            config,
            stream: None,
            span,
        }
    }

    /// Parents every event this connection emits on `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Returns the connection parameters.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the span events are logged under.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Returns true if a live transport is held.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns true if the transport is TLS-encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.get_ref().is_tls())
    }

    /// Opens a TCP transport, negotiates implicit TLS if configured, and
    /// reads the greeting. Returns the greeting without its terminator.
    ///
    /// `greeting_ok` is the protocol's positive-greeting predicate.
    pub async fn connect<F>(&mut self, greeting_ok: F) -> Result<String>
    where
        F: FnOnce(&str) -> bool,
    {
        self.ensure_can_connect()?;
        let tcp = open_tcp(&self.config).await?;
        tracing::info!(parent: &self.span, security = ?self.config.security, "Connected");
        self.establish(Box::new(tcp), greeting_ok).await
    }

    /// Like [`connect`](Self::connect), over a caller-supplied transport.
    pub async fn connect_with_stream<S, F>(&mut self, stream: S, greeting_ok: F) -> Result<String>
    where
        S: Io + 'static,
        F: FnOnce(&str) -> bool,
    {
        self.ensure_can_connect()?;
        self.establish(Box::new(stream), greeting_ok).await
    }

    fn ensure_can_connect(&self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }
        if self.config.security.requires_tls() && !cfg!(feature = "tls") {
            return Err(Error::UnsupportedTransport(self.config.security));
        }
        Ok(())
    }

    async fn establish<F>(&mut self, raw: BoxedIo, greeting_ok: F) -> Result<String>
    where
        F: FnOnce(&str) -> bool,
    {
        let mut stream = MailStream::Plain(raw);
        if self.config.security == Security::Implicit {
            stream = stream.upgrade_to_tls(&self.config).await?;
            tracing::debug!(parent: &self.span, "TLS established");
        }
        self.stream = Some(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream));

        let greeting = self.read_line(true).await?;
        tracing::debug!(parent: &self.span, %greeting, "Greeting");

        if !greeting_ok(&greeting) {
            self.close();
            return Err(Error::NegativeGreeting(greeting));
        }
        Ok(greeting)
    }

    /// Reads one CRLF-terminated line.
    ///
    /// Keeps reading until the terminator arrives, however the bytes are
    /// split across reads. With `trim` the terminator is stripped. Invalid
    /// UTF-8 is replaced rather than rejected.
    pub async fn read_line(&mut self, trim: bool) -> Result<String> {
        let Some(reader) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };

        match read_crlf_line(reader).await {
            Ok(mut bytes) => {
                if trim {
                    bytes.truncate(bytes.len() - CRLF.len());
                }
                let line = String::from_utf8_lossy(&bytes).into_owned();
                tracing::trace!(parent: &self.span, line = line.trim_end(), "S:");
                Ok(line)
            }
            Err(reason) => {
                tracing::warn!(parent: &self.span, %reason, "Read failed, closing");
                self.close();
                Err(Error::ReadFailed(reason))
            }
        }
    }

    /// Writes `text` followed by CRLF.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        tracing::debug!(parent: &self.span, line = text, "C:");
        self.write_terminated(text).await
    }

    /// Writes `text` followed by CRLF, logging `shown` in its place.
    ///
    /// Used for credentials and message payloads.
    pub async fn write_sensitive_line(&mut self, text: &str, shown: &str) -> Result<()> {
        tracing::debug!(parent: &self.span, line = shown, "C:");
        self.write_terminated(text).await
    }

    async fn write_terminated(&mut self, text: &str) -> Result<()> {
        let Some(reader) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };

        let mut data = Vec::with_capacity(text.len() + CRLF.len());
        data.extend_from_slice(text.as_bytes());
        data.extend_from_slice(CRLF.as_bytes());

        let stream = reader.get_mut();
        let result = match stream.write_all(&data).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::warn!(parent: &self.span, error = %e, "Write failed, closing");
            self.close();
            return Err(Error::WriteFailed(e.to_string()));
        }
        Ok(())
    }

    /// Performs a TLS handshake on the open transport.
    ///
    /// Call once, right after the server acknowledged the protocol's upgrade
    /// command. A failed handshake leaves the connection closed.
    pub async fn upgrade_to_encrypted(&mut self) -> Result<()> {
        if self.is_encrypted() {
            return Err(Error::TlsNegotiation("the connection is already encrypted".into()));
        }
        let Some(reader) = self.stream.take() else {
            return Err(Error::NotConnected);
        };

        // Anything buffered now arrived before the handshake and must not be
        // trusted as coming from inside the TLS session.
        if !reader.buffer().is_empty() {
            tracing::warn!(parent: &self.span, "Plaintext data received before TLS handshake");
            return Err(Error::TlsNegotiation(
                "unexpected data received before the handshake".into(),
            ));
        }

        match reader.into_inner().upgrade_to_tls(&self.config).await {
            Ok(tls) => {
                self.stream = Some(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, tls));
                tracing::info!(parent: &self.span, "Upgraded to TLS");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "TLS upgrade failed");
                Err(e)
            }
        }
    }

    /// Releases the transport. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(parent: &self.span, "Connection closed");
        }
    }
}

/// Reads up to and including the next CRLF.
///
/// Every chunk is counted against `MAX_LINE_LENGTH` as it is buffered, so a
/// server that never sends a terminator cannot grow the line without bound.
async fn read_crlf_line(
    reader: &mut BufReader<MailStream>,
) -> std::result::Result<Vec<u8>, String> {
    let mut line = Vec::new();

    loop {
        let buf = reader.fill_buf().await.map_err(|e| e.to_string())?;
        if buf.is_empty() {
            return Err("connection closed by server".into());
        }

        let (take, found_lf) = match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (buf.len(), false),
        };
        line.extend_from_slice(&buf[..take]);
        reader.consume(take);

        // A bare LF does not end the line.
        if found_lf && line.ends_with(CRLF.as_bytes()) {
            return Ok(line);
        }
        if line.len() > MAX_LINE_LENGTH {
            return Err("line too long".into());
        }
    }
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
    use tokio_test::io::Builder;

    fn plain_config() -> Config {
        Config::new("mail.example.com", 110, Security::None).unwrap()
    }

    fn positive(line: &str) -> bool {
        line.starts_with("+OK")
    }

    #[tokio::test]
    async fn test_greeting_accepted() {
        let mock = Builder::new().read(b"+OK POP3 ready\r\n").build();
        let mut conn = Connection::new(plain_config());

        let greeting = conn.connect_with_stream(mock, positive).await.unwrap();
        assert_eq!(greeting, "+OK POP3 ready");
        assert!(conn.is_connected());
        assert!(!conn.is_encrypted());
    }

    #[tokio::test]
    async fn test_negative_greeting_closes() {
        let mock = Builder::new().read(b"-ERR go away\r\n").build();
        let mut conn = Connection::new(plain_config());

        let err = conn.connect_with_stream(mock, positive).await.unwrap_err();
        match err {
            Error::NegativeGreeting(greeting) => assert_eq!(greeting, "-ERR go away"),
            other => panic!("expected NegativeGreeting, got {other:?}"),
        }
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_already_connected() {
        let mock = Builder::new().read(b"+OK\r\n").build();
        let mut conn = Connection::new(plain_config());
        conn.connect_with_stream(mock, positive).await.unwrap();

        let second = Builder::new().build();
        let err = conn.connect_with_stream(second, positive).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyConnected));
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn test_read_line_across_partial_reads() {
        let mock = Builder::new()
            .read(b"+OK\r\n")
            .read(b"+OK 3 ")
            .read(b"1200\r")
            .read(b"\n")
            .build();
        let mut conn = Connection::new(plain_config());
        conn.connect_with_stream(mock, positive).await.unwrap();

        assert_eq!(conn.read_line(true).await.unwrap(), "+OK 3 1200");
    }

    #[tokio::test]
    async fn test_read_line_keeps_terminator_when_untrimmed() {
        let mock = Builder::new().read(b"+OK\r\nbare\nline\r\n").build();
        let mut conn = Connection::new(plain_config());
        conn.connect_with_stream(mock, positive).await.unwrap();

        assert_eq!(conn.read_line(false).await.unwrap(), "bare\nline\r\n");
    }

    #[tokio::test]
    async fn test_read_eof_closes() {
        let mock = Builder::new().read(b"+OK\r\n").read(b"+OK trunc").build();
        let mut conn = Connection::new(plain_config());
        conn.connect_with_stream(mock, positive).await.unwrap();

        let err = conn.read_line(true).await.unwrap_err();
        assert!(matches!(err, Error::ReadFailed(_)));
        assert!(err.is_io());
        assert!(!conn.is_connected());

        let err = conn.read_line(true).await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        // No terminator ever arrives.
        let long_line = "a".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new()
            .read(b"+OK\r\n")
            .read(long_line.as_bytes())
            .build();
        let mut conn = Connection::new(plain_config());
        conn.connect_with_stream(mock, positive).await.unwrap();

        let err = conn.read_line(true).await.unwrap_err();
        assert!(err.to_string().contains("line too long"));
        assert!(err.is_io());
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_write_line_appends_crlf() {
        let mock = Builder::new()
            .read(b"+OK\r\n")
            .write(b"NOOP\r\n")
            .write(b"PASS secret\r\n")
            .build();
        let mut conn = Connection::new(plain_config());
        conn.connect_with_stream(mock, positive).await.unwrap();

        conn.write_line("NOOP").await.unwrap();
        conn.write_sensitive_line("PASS secret", "PASS ****")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_failure_closes() {
        let mock = Builder::new()
            .read(b"+OK\r\n")
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            ))
            .build();
        let mut conn = Connection::new(plain_config());
        conn.connect_with_stream(mock, positive).await.unwrap();

        let err = conn.write_line("NOOP").await.unwrap_err();
        assert!(matches!(err, Error::WriteFailed(_)));
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_write_when_never_opened() {
        let mut conn = Connection::new(plain_config());
        let err = conn.write_line("NOOP").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut conn = Connection::new(plain_config());
        conn.close();
        conn.close();
        assert!(!conn.is_connected());

        let mock = Builder::new().read(b"+OK\r\n").build();
        conn.connect_with_stream(mock, positive).await.unwrap();
        conn.close();
        conn.close();
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_upgrade_refuses_buffered_plaintext() {
        let mock = Builder::new()
            .read(b"+OK\r\n+OK begin TLS\r\ninjected\r\n")
            .build();
        let mut conn = Connection::new(plain_config());
        conn.connect_with_stream(mock, positive).await.unwrap();
        conn.read_line(true).await.unwrap();

        let err = conn.upgrade_to_encrypted().await.unwrap_err();
        assert!(matches!(err, Error::TlsNegotiation(_)));
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_upgrade_requires_connection() {
        let mut conn = Connection::new(plain_config());
        let err = conn.upgrade_to_encrypted().await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }
}
