//! Error types for POP3 operations.

use mailwire_net::AuthMechanism;
use thiserror::Error;

use crate::SessionState;

/// Result type alias for POP3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// POP3 error types.
#[derive(Debug, Error)]
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

    /// Server answered `-ERR` (or something other than `+OK`).
    #[error("The server sent a negative response to the {command} command: {response}")]
    NegativeResponse {
        /// Command keyword.
        command: &'static str,
        /// Raw response line.
        response: String,
    },

    /// Server does not advertise a required capability.
    #[error("The server does not support the {0} command")]
    Capability(String),

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Mechanism is recognised but not implemented for POP3.
    #[error("Unsupported authentication mechanism: {0}")]
    UnsupportedMechanism(AuthMechanism),

    /// A positive response could not be parsed.
    #[error("Malformed response to the {command} command: {response}")]
    MalformedResponse {
        /// Command keyword.
        command: &'static str,
        /// Raw response line.
        response: String,
    },

    /// A required argument was not supplied.
    #[error("A {argument} is required by the {command} command")]
    MissingArgument {
        /// Command keyword.
        command: &'static str,
        /// Name of the missing argument.
        argument: &'static str,
    },
}

impl Error {
    /// Returns true if the failure dropped the connection.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_io())
    }
}
