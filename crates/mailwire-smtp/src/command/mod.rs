//! SMTP command builder.

use mailwire_net::AuthMechanism;

use crate::state::StateSet;
use crate::types::Address;

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// A base64 response line inside an AUTH exchange
    AuthResponse {
        /// Encoded payload
        payload: String,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// VRFY - Verify address
    Vrfy {
        /// User or mailbox to verify
        address: String,
    },
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Returns the command keyword.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } | Self::AuthResponse { .. } => "AUTH",
            Self::MailFrom { .. } => "MAIL",
            Self::RcptTo { .. } => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Vrfy { .. } => "VRFY",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }

    /// Returns the states in which the command may be issued.
    #[must_use]
    pub const fn allowed_states(&self) -> StateSet {
        match self {
            Self::MailFrom { .. } | Self::RcptTo { .. } | Self::Data => StateSet::AUTHENTICATED,
            Self::StartTls | Self::Auth { .. } | Self::AuthResponse { .. } => StateSet::CONNECTED,
            _ => StateSet::CONNECTED_OR_AUTHENTICATED,
        }
    }

    /// Serializes the command line, without the terminator.
    #[must_use]
    pub fn serialize(&self) -> String {
        match self {
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::Auth {
                mechanism,
                initial_response: Some(response),
            } => format!("AUTH {mechanism} {response}"),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => format!("AUTH {mechanism}"),
            Self::AuthResponse { payload } => payload.clone(),
            Self::MailFrom { from } => format!("MAIL FROM:<{from}>"),
            Self::RcptTo { to } => format!("RCPT TO:<{to}>"),
            Self::Vrfy { address } => format!("VRFY {address}"),
            other => other.name().to_string(),
        }
    }

    /// The command line as it may appear in logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Auth {
                mechanism,
                initial_response: Some(_),
            } => format!("AUTH {mechanism} ****"),
            Self::AuthResponse { .. } => "****".to_string(),
            other => other.serialize(),
        }
    }

    /// Returns true if the line carries credentials.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(
            self,
            Self::Auth {
                initial_response: Some(_),
                ..
            } | Self::AuthResponse { .. }
        )
    }
}

/// Prepares message text for the DATA phase.
///
/// Line endings become CRLF, one trailing line break is dropped, and every
/// line starting with `.` gets a second `.` so it cannot end the data early.
/// The terminating `.` line is not included. Input that is only a line break
/// yields an empty string, which stands for one blank line.
#[must_use]
pub fn dot_stuff(text: &str) -> String {
    let text = text
        .strip_suffix('\n')
        .map_or(text, |t| t.strip_suffix('\r').unwrap_or(t));
    if text.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(text.len() + 16);
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push_str("\r\n");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
    }
    out
}
