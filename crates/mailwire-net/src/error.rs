//! Error types for the connection layer.

use thiserror::Error;

use crate::Security;

/// Errors raised while opening, using or upgrading a connection.
#[derive(Debug, Error)]
pub enum Error {
    /// A required connection parameter is missing or invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// `connect` was called while a transport is already held.
    #[error("The connection is already established")]
    AlreadyConnected,

    /// An operation needed a live transport but none is held.
    #[error("Not connected")]
    NotConnected,

    /// The security mode needs TLS support that was not compiled in.
    #[error("Transport {0:?} requires TLS support, which is not available")]
    UnsupportedTransport(Security),

    /// The transport could not be opened.
    #[error("Failed to connect to server {host}:{port}: {reason}")]
    ConnectFailed {
        /// Server hostname.
        host: String,
        /// Server port.
        port: u16,
        /// What went wrong.
        reason: String,
    },

    /// The server greeted with a negative response.
    #[error("Negative greeting from the server: {0:?}")]
    NegativeGreeting(String),

    /// Reading from the transport failed or hit end-of-stream.
    #[error("Failed to read from the connection: {0}")]
    ReadFailed(String),

    /// Writing to the transport failed.
    #[error("Failed to write to the connection: {0}")]
    WriteFailed(String),

    /// The in-place TLS handshake failed.
    #[error("TLS negotiation failed: {0}")]
    TlsNegotiation(String),
}

impl Error {
    /// Returns true for failures that dropped the transport.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(
            self,
            Self::ReadFailed(_) | Self::WriteFailed(_) | Self::TlsNegotiation(_)
        )
    }
}

/// Result type alias using the connection error.
pub type Result<T> = std::result::Result<T, Error>;
