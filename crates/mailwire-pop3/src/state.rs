//! POP3 session states.
//!
//! RFC 1939 section 3 defines the session as moving through AUTHORIZATION,
//! TRANSACTION and UPDATE once the greeting has been received. Before that,
//! and after the connection is closed, the session is not connected.

/// POP3 session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No transport is held.
    #[default]
    NotConnected,

    /// Greeted; the client must identify itself.
    ///
    /// Valid commands: CAPA, STLS, USER, PASS, AUTH, QUIT.
    Authorization,

    /// Authenticated; the maildrop is locked for this session.
    ///
    /// Valid commands: CAPA, STAT, LIST, RETR, DELE, NOOP, RSET, TOP, UIDL,
    /// QUIT.
    Transaction,

    /// QUIT was sent; deletions are being committed. Terminal.
    Update,
}

impl SessionState {
    /// Name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotConnected => "STATE_NOT_CONNECTED",
            Self::Authorization => "STATE_AUTHORIZATION",
            Self::Transaction => "STATE_TRANSACTION",
            Self::Update => "STATE_UPDATE",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// States in which a command may be issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSet(&'static [SessionState]);

impl StateSet {
    /// AUTHORIZATION only.
    pub const AUTHORIZATION: Self = Self(&[SessionState::Authorization]);
    /// TRANSACTION only.
    pub const TRANSACTION: Self = Self(&[SessionState::Transaction]);
    /// AUTHORIZATION or TRANSACTION.
    pub const AUTHORIZATION_OR_TRANSACTION: Self =
        Self(&[SessionState::Authorization, SessionState::Transaction]);

    /// Returns true if `state` is a member.
    #[must_use]
    pub fn contains(self, state: SessionState) -> bool {
        self.0.contains(&state)
    }

    /// Iterates over the member states.
    pub fn iter(self) -> impl Iterator<Item = SessionState> {
        self.0.iter().copied()
    }
}
