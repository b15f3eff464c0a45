//! Error types for SMTP operations.

use mailwire_net::AuthMechanism;

use crate::SessionState;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Connection-level failure (connect, greeting, I/O, TLS).
    #[error(transparent)]
    Connection(#[from] mailwire_net::Error),

    /// Command issued in a state that does not allow it.
    #[error("The {command} command is invalid for the current state: {state}")]
    InvalidState {
        /// Command keyword.
        command: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// Server returned an unexpected reply code.
    #[error("The server returned a negative response to the {command} command: {response}")]
    NegativeResponse {
        /// Command keyword.
        command: &'static str,
        /// Reply code (e.g., 550).
        code: u16,
        /// Reply as received.
        response: String,
    },

    /// Server does not advertise a required extension.
    #[error("The server does not support the {0} command")]
    Capability(String),

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Mechanism is recognised but not implemented.
    #[error("Unsupported authentication mechanism: {0}")]
    UnsupportedMechanism(AuthMechanism),

    /// Reply lines without a three-digit code.
    #[error("Malformed response to the {command} command: {response}")]
    MalformedResponse {
        /// Command keyword.
        command: &'static str,
        /// Raw reply lines.
        response: String,
    },

    /// The message lacks a sender or recipients.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

impl Error {
    /// Returns the reply code of a negative response.
    #[must_use]
    pub const fn code(&self) -> Option<u16> {
        match self {
            Self::NegativeResponse { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::NegativeResponse { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NegativeResponse { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true if the failure dropped the connection.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_io())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negative(code: u16) -> Error {
        Error::NegativeResponse {
            command: "RCPT",
            code,
            response: format!("{code} nope"),
        }
    }

    #[test]
    fn test_classification() {
        assert!(negative(550).is_permanent());
        assert!(!negative(550).is_transient());
        assert!(negative(451).is_transient());
        assert_eq!(negative(451).code(), Some(451));
        assert_eq!(Error::Capability("VRFY".into()).code(), None);
        assert!(!Error::InvalidMessage("x".into()).is_permanent());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            negative(550).to_string(),
            "The server returned a negative response to the RCPT command: 550 nope"
        );
    }
}
