//! POP3 command builder.

use crate::state::StateSet;

/// POP3 command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPA - List server capabilities (RFC 2449)
    Capa,
    /// STLS - Upgrade to TLS (RFC 2595)
    Stls,
    /// USER - Name the maildrop
    User {
        /// Mailbox name
        name: String,
    },
    /// PASS - Maildrop password
    Pass {
        /// Password
        secret: String,
    },
    /// AUTH LOGIN - Start a LOGIN exchange (RFC 5034)
    AuthLogin,
    /// A base64 response line inside an AUTH exchange
    AuthResponse {
        /// Encoded payload
        payload: String,
    },
    /// STAT - Maildrop status
    Stat,
    /// LIST - Scan listing, for one message or all
    List {
        /// Message number
        message: Option<u32>,
    },
    /// RETR - Retrieve a message
    Retr {
        /// Message number
        message: u32,
    },
    /// DELE - Mark a message deleted
    Dele {
        /// Message number
        message: u32,
    },
    /// NOOP - No operation
    Noop,
    /// RSET - Unmark deleted messages
    Rset,
    /// TOP - Headers plus the first lines of the body
    Top {
        /// Message number
        message: u32,
        /// Body lines to include
        lines: u32,
    },
    /// UIDL - Unique-id listing, for one message or all
    Uidl {
        /// Message number
        message: Option<u32>,
    },
    /// QUIT - End the session
    Quit,
}

impl Command {
    /// Returns the command keyword.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capa => "CAPA",
            Self::Stls => "STLS",
            Self::User { .. } => "USER",
            Self::Pass { .. } => "PASS",
            Self::AuthLogin | Self::AuthResponse { .. } => "AUTH",
            Self::Stat => "STAT",
            Self::List { .. } => "LIST",
            Self::Retr { .. } => "RETR",
            Self::Dele { .. } => "DELE",
            Self::Noop => "NOOP",
            Self::Rset => "RSET",
            Self::Top { .. } => "TOP",
            Self::Uidl { .. } => "UIDL",
            Self::Quit => "QUIT",
        }
    }

    /// Returns the states in which the command may be issued.
    #[must_use]
    pub const fn allowed_states(&self) -> StateSet {
        match self {
            Self::Capa | Self::Quit => StateSet::AUTHORIZATION_OR_TRANSACTION,
            Self::Stls
            | Self::User { .. }
            | Self::Pass { .. }
            | Self::AuthLogin
            | Self::AuthResponse { .. } => StateSet::AUTHORIZATION,
            Self::Stat
            | Self::List { .. }
            | Self::Retr { .. }
            | Self::Dele { .. }
            | Self::Noop
            | Self::Rset
            | Self::Top { .. }
            | Self::Uidl { .. } => StateSet::TRANSACTION,
        }
    }

    /// Serializes the command line, without the terminator.
    #[must_use]
    pub fn serialize(&self) -> String {
        match self {
            Self::User { name } => format!("USER {name}"),
            Self::Pass { secret } => format!("PASS {secret}"),
            Self::AuthLogin => "AUTH LOGIN".to_string(),
            Self::AuthResponse { payload } => payload.clone(),
            Self::List { message: Some(n) } => format!("LIST {n}"),
            Self::Retr { message } => format!("RETR {message}"),
            Self::Dele { message } => format!("DELE {message}"),
            Self::Top { message, lines } => format!("TOP {message} {lines}"),
            Self::Uidl { message: Some(n) } => format!("UIDL {n}"),
            other => other.name().to_string(),
        }
    }

    /// The command line as it may appear in logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Pass { .. } => "PASS ****".to_string(),
            Self::AuthResponse { .. } => "****".to_string(),
            other => other.serialize(),
        }
    }

    /// Returns true if the line carries credentials.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::Pass { .. } | Self::AuthResponse { .. })
    }
}
