//! SMTP session states.

/// Submission session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No transport is held.
    #[default]
    NotConnected,
    /// Greeted (and upgraded, if configured); not yet authenticated.
    Connected,
    /// Credentials accepted; mail transactions are allowed.
    Authenticated,
}

impl SessionState {
    /// Name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotConnected => "STATE_NOT_CONNECTED",
            Self::Connected => "STATE_CONNECTED",
            Self::Authenticated => "STATE_AUTHENTICATED",
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
    /// CONNECTED only.
    pub const CONNECTED: Self = Self(&[SessionState::Connected]);
    /// AUTHENTICATED only.
    pub const AUTHENTICATED: Self = Self(&[SessionState::Authenticated]);
    /// Any live session.
    pub const CONNECTED_OR_AUTHENTICATED: Self =
        Self(&[SessionState::Connected, SessionState::Authenticated]);

    /// Returns true if `state` is a member.
    #[must_use]
    pub fn contains(self, state: SessionState) -> bool {
        self.0.contains(&state)
    }
}
