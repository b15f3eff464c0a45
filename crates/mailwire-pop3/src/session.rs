//! POP3 mailbox session.
//!
//! ```text
//!  NotConnected ── connect() ──→ Authorization ── authenticate() ──→ Transaction
//!        ↑                            │                                  │
//!        └──────── close / I/O error / quit() ←──── Update ←─────────────┘
//! ```
//!
//! Every command declares the states it is legal in. The check runs before
//! anything is written, so a command issued too early fails with
//! [`Error::InvalidState`] and never reaches the server.

use std::collections::BTreeMap;

use base64::Engine;
use mailwire_net::{AuthMechanism, CRLF, Config, Connection, Io, Protocol, Security};
use tracing::Span;

use crate::command::Command;
use crate::response::{self, MaildropStatus};
use crate::state::{SessionState, StateSet};
use crate::{Error, Result};

/// A POP3 session over one connection.
#[derive(Debug)]
pub struct MailboxSession {
    conn: Connection,
    state: SessionState,
    /// `None` until CAPA has been issued on this connection.
    capabilities: Option<Vec<String>>,
}

impl MailboxSession {
    /// Creates an unconnected session.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let span = tracing::info_span!(
            "session",
            protocol = Protocol::Pop3.as_str(),
            host = %config.host,
            port = config.port
        );
        Self {
            conn: Connection::new(config).with_span(span),
            state: SessionState::NotConnected,
            capabilities: None,
        }
    }

    /// Logs everything this session does under `span`.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.conn = self.conn.with_span(span);
        self
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        if self.conn.is_connected() {
            self.state
        } else {
            SessionState::NotConnected
        }
    }

    /// Returns true if a transport is held.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Returns true if the transport is TLS-encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.conn.is_encrypted()
    }

    /// Returns the capabilities fetched so far, if any.
    #[must_use]
    pub fn cached_capabilities(&self) -> Option<&[String]> {
        self.capabilities.as_deref()
    }

    /// Connects, validates the `+OK` greeting, and upgrades with STLS when
    /// the security mode asks for it.
    ///
    /// # Errors
    ///
    /// Connection errors, or STLS failures (the connection is then closed).
    pub async fn connect(&mut self) -> Result<()> {
        self.conn.connect(response::is_positive).await?;
        self.after_greeting().await
    }

    /// Like [`connect`](Self::connect), over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_with_stream<S: Io + 'static>(&mut self, stream: S) -> Result<()> {
        self.conn
            .connect_with_stream(stream, response::is_positive)
            .await?;
        self.after_greeting().await
    }

    async fn after_greeting(&mut self) -> Result<()> {
        self.state = SessionState::Authorization;
        self.capabilities = None;

        if self.conn.config().security == Security::StartTls {
            if let Err(e) = self.starttls().await {
                self.close();
                return Err(e);
            }
        }
        Ok(())
    }

    async fn starttls(&mut self) -> Result<()> {
        self.check_state(&Command::Stls)?;
        self.is_server_capable("STLS").await?;
        self.simple(Command::Stls).await?;
        self.conn.upgrade_to_encrypted().await?;
        // RFC 2595: capabilities must be re-queried after the upgrade.
        self.capabilities = None;
        Ok(())
    }

    /// Issues CAPA and caches the result.
    ///
    /// Always queries the server; use [`cached_capabilities`] to avoid a
    /// round trip.
    ///
    /// [`cached_capabilities`]: Self::cached_capabilities
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] outside AUTHORIZATION/TRANSACTION,
    /// [`Error::NegativeResponse`] if the server rejects CAPA.
    pub async fn capabilities(&mut self) -> Result<Vec<String>> {
        self.simple(Command::Capa).await?;
        let lines = self.read_body().await?;
        self.capabilities = Some(lines.clone());
        Ok(lines)
    }

    /// Issues CAPA and returns the raw lines joined with CRLF.
    ///
    /// # Errors
    ///
    /// See [`capabilities`](Self::capabilities).
    pub async fn capabilities_raw(&mut self) -> Result<String> {
        Ok(self.capabilities().await?.join(CRLF))
    }

    /// Fails unless the server advertises `capability`, fetching the
    /// capability list first if this connection has none cached.
    ///
    /// # Errors
    ///
    /// [`Error::Capability`] if absent, or any CAPA failure.
    pub async fn is_server_capable(&mut self, capability: &str) -> Result<()> {
        if self.capabilities.is_none() {
            self.capabilities().await?;
        }

        let advertised = self
            .capabilities
            .iter()
            .flatten()
            .any(|line| advertises(line, capability));

        if advertised {
            Ok(())
        } else {
            Err(Error::Capability(capability.to_string()))
        }
    }

    /// Authenticates and enters TRANSACTION.
    ///
    /// `Plain` sends USER then PASS; `Login` runs the AUTH LOGIN exchange.
    /// On failure the session stays in AUTHORIZATION.
    ///
    /// # Errors
    ///
    /// [`Error::Authentication`] if the server rejects any step,
    /// [`Error::UnsupportedMechanism`] for other mechanisms.
    pub async fn authenticate(
        &mut self,
        user: &str,
        secret: &str,
        mechanism: AuthMechanism,
    ) -> Result<()> {
        self.check_allowed("AUTH", StateSet::AUTHORIZATION)?;

        match mechanism {
            AuthMechanism::Plain => self.auth_user_pass(user, secret).await?,
            AuthMechanism::Login => self.auth_login(user, secret).await?,
            other => return Err(Error::UnsupportedMechanism(other)),
        }

        self.state = SessionState::Transaction;
        tracing::info!(parent: self.conn.span(), %mechanism, "Authenticated");
        Ok(())
    }

    async fn auth_user_pass(&mut self, user: &str, secret: &str) -> Result<()> {
        let response = self
            .send(&Command::User {
                name: user.to_string(),
            })
            .await?;
        if !response::is_positive(&response) {
            return Err(Error::Authentication(format!(
                "The username is not valid: {}",
                response::status_text(&response)
            )));
        }

        let response = self
            .send(&Command::Pass {
                secret: secret.to_string(),
            })
            .await?;
        if !response::is_positive(&response) {
            return Err(Error::Authentication(format!(
                "The password is not valid: {}",
                response::status_text(&response)
            )));
        }
        Ok(())
    }

    async fn auth_login(&mut self, user: &str, secret: &str) -> Result<()> {
        let engine = base64::engine::general_purpose::STANDARD;

        let response = self.send(&Command::AuthLogin).await?;
        if !response::is_continuation(&response) {
            return Err(Error::Authentication(format!(
                "The server rejected AUTH LOGIN: {}",
                response::status_text(&response)
            )));
        }

        let response = self
            .send(&Command::AuthResponse {
                payload: engine.encode(user),
            })
            .await?;
        if !response::is_continuation(&response) {
            return Err(Error::Authentication(format!(
                "The server did not accept the username: {}",
                response::status_text(&response)
            )));
        }

        let response = self
            .send(&Command::AuthResponse {
                payload: engine.encode(secret),
            })
            .await?;
        if !response::is_positive(&response) {
            return Err(Error::Authentication(format!(
                "The server did not accept the password: {}",
                response::status_text(&response)
            )));
        }
        Ok(())
    }

    /// Issues STAT.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] on `-ERR`, [`Error::MalformedResponse`]
    /// if the counts cannot be parsed.
    pub async fn status(&mut self) -> Result<MaildropStatus> {
        let response = self.simple(Command::Stat).await?;
        response::parse_stat(&response).ok_or_else(|| Error::MalformedResponse {
            command: "STAT",
            response,
        })
    }

    /// Issues LIST for every message: message number → size in octets.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] on `-ERR`, [`Error::MalformedResponse`]
    /// for an unparsable listing line.
    pub async fn list(&mut self) -> Result<BTreeMap<u32, u64>> {
        self.simple(Command::List { message: None }).await?;
        let lines = self.read_body().await?;
        lines
            .into_iter()
            .map(|line| {
                response::parse_scan_line(&line).ok_or_else(|| Error::MalformedResponse {
                    command: "LIST",
                    response: line,
                })
            })
            .collect()
    }

    /// Issues LIST for one message: `(message number, size)`.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] on `-ERR` (for instance, no such
    /// message), [`Error::MalformedResponse`] if unparsable.
    pub async fn list_message(&mut self, message: u32) -> Result<(u32, u64)> {
        let response = self
            .simple(Command::List {
                message: Some(message),
            })
            .await?;
        response::parse_scan_line(&response).ok_or_else(|| Error::MalformedResponse {
            command: "LIST",
            response,
        })
    }

    /// Issues RETR and returns the message, de-stuffed, each line ending
    /// in CRLF. The terminating `.` line is not included.
    ///
    /// # Errors
    ///
    /// [`Error::MissingArgument`] without a message number,
    /// [`Error::NegativeResponse`] on `-ERR`.
    pub async fn retrieve(&mut self, message: impl Into<Option<u32>>) -> Result<String> {
        self.check_allowed("RETR", StateSet::TRANSACTION)?;
        let message = required(message.into(), "RETR", "message number")?;

        self.simple(Command::Retr { message }).await?;
        Ok(join_lines(self.read_body().await?))
    }

    /// Marks a message deleted.
    ///
    /// # Errors
    ///
    /// [`Error::MissingArgument`] without a message number,
    /// [`Error::NegativeResponse`] on `-ERR`.
    pub async fn delete(&mut self, message: impl Into<Option<u32>>) -> Result<()> {
        self.check_allowed("DELE", StateSet::TRANSACTION)?;
        let message = required(message.into(), "DELE", "message number")?;

        self.simple(Command::Dele { message }).await?;
        Ok(())
    }

    /// Unmarks deleted messages.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] on `-ERR`.
    pub async fn reset(&mut self) -> Result<()> {
        self.simple(Command::Rset).await?;
        Ok(())
    }

    /// Keeps the session alive.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] on `-ERR`.
    pub async fn noop(&mut self) -> Result<()> {
        self.simple(Command::Noop).await?;
        Ok(())
    }

    /// Issues TOP: the headers plus the first `lines` body lines, de-stuffed.
    ///
    /// # Errors
    ///
    /// [`Error::MissingArgument`] without both arguments,
    /// [`Error::Capability`] if TOP is not advertised,
    /// [`Error::NegativeResponse`] on `-ERR`.
    pub async fn top(
        &mut self,
        message: impl Into<Option<u32>>,
        lines: impl Into<Option<u32>>,
    ) -> Result<String> {
        self.check_allowed("TOP", StateSet::TRANSACTION)?;
        let message = required(message.into(), "TOP", "message number")?;
        let lines = required(lines.into(), "TOP", "number of lines")?;
        self.is_server_capable("TOP").await?;

        self.simple(Command::Top { message, lines }).await?;
        Ok(join_lines(self.read_body().await?))
    }

    /// Issues UIDL for every message: message number → unique id.
    ///
    /// # Errors
    ///
    /// [`Error::Capability`] if UIDL is not advertised,
    /// [`Error::NegativeResponse`] on `-ERR`, [`Error::MalformedResponse`]
    /// for an unparsable listing line.
    pub async fn unique_ids(&mut self) -> Result<BTreeMap<u32, String>> {
        self.check_allowed("UIDL", StateSet::TRANSACTION)?;
        self.is_server_capable("UIDL").await?;

        self.simple(Command::Uidl { message: None }).await?;
        let lines = self.read_body().await?;
        lines
            .into_iter()
            .map(|line| {
                response::parse_uid_line(&line).ok_or_else(|| Error::MalformedResponse {
                    command: "UIDL",
                    response: line,
                })
            })
            .collect()
    }

    /// Issues UIDL for one message: `(message number, unique id)`.
    ///
    /// # Errors
    ///
    /// See [`unique_ids`](Self::unique_ids).
    pub async fn unique_id(&mut self, message: u32) -> Result<(u32, String)> {
        self.check_allowed("UIDL", StateSet::TRANSACTION)?;
        self.is_server_capable("UIDL").await?;

        let response = self
            .simple(Command::Uidl {
                message: Some(message),
            })
            .await?;
        response::parse_uid_line(&response).ok_or_else(|| Error::MalformedResponse {
            command: "UIDL",
            response,
        })
    }

    /// Enters UPDATE, sends QUIT, and closes the connection once the server
    /// acknowledges.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] if the server could not commit; the
    /// session is then left in UPDATE with the connection open.
    pub async fn quit(&mut self) -> Result<()> {
        self.check_state(&Command::Quit)?;
        self.state = SessionState::Update;

        let response = self.transmit(&Command::Quit).await?;
        if !response::is_positive(&response) {
            return Err(Error::NegativeResponse {
                command: "QUIT",
                response,
            });
        }

        self.close();
        Ok(())
    }

    /// Drops the connection without QUIT. No-op if never opened.
    pub fn close(&mut self) {
        self.conn.close();
        self.state = SessionState::NotConnected;
        self.capabilities = None;
    }

    fn check_state(&self, command: &Command) -> Result<()> {
        self.check_allowed(command.name(), command.allowed_states())
    }

    fn check_allowed(&self, command: &'static str, allowed: StateSet) -> Result<()> {
        let state = self.state();
        if allowed.contains(state) {
            Ok(())
        } else {
            Err(Error::InvalidState { command, state })
        }
    }

    /// Checks the state, writes the command, returns the first response line.
    async fn send(&mut self, command: &Command) -> Result<String> {
        self.check_state(command)?;
        self.transmit(command).await
    }

    async fn transmit(&mut self, command: &Command) -> Result<String> {
        let line = command.serialize();
        if command.is_sensitive() {
            self.conn
                .write_sensitive_line(&line, &command.redacted())
                .await?;
        } else {
            self.conn.write_line(&line).await?;
        }
        Ok(self.conn.read_line(true).await?)
    }

    /// Sends a command that must be answered with `+OK`.
    async fn simple(&mut self, command: Command) -> Result<String> {
        let response = self.send(&command).await?;
        if response::is_positive(&response) {
            Ok(response)
        } else {
            Err(Error::NegativeResponse {
                command: command.name(),
                response,
            })
        }
    }

    /// Reads a multiline body up to the termination line.
    async fn read_body(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.conn.read_line(true).await?;
            if response::is_termination(&line) {
                break;
            }
            lines.push(response::destuff(&line).to_string());
        }
        Ok(lines)
    }
}

/// Matches a CAPA line on its first token, ignoring case.
fn advertises(line: &str, capability: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|token| token.eq_ignore_ascii_case(capability))
}

fn required(value: Option<u32>, command: &'static str, argument: &'static str) -> Result<u32> {
    value.ok_or(Error::MissingArgument { command, argument })
}

fn join_lines(lines: Vec<String>) -> String {
    let mut text = String::with_capacity(lines.iter().map(|l| l.len() + CRLF.len()).sum());
    for line in lines {
        text.push_str(&line);
        text.push_str(CRLF);
    }
    text
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
    use tokio_test::io::{Builder, Mock};

    fn config() -> Config {
        Config::new("pop.example.com", 110, Security::None).unwrap()
    }

    async fn connected(mock: Mock) -> MailboxSession {
        let mut session = MailboxSession::new(config());
        session.connect_with_stream(mock).await.unwrap();
        session
    }

    /// Greeting plus a successful USER/PASS login.
    fn logged_in() -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"+OK POP3 server ready\r\n")
            .write(b"USER bob\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS secret\r\n")
            .read(b"+OK maildrop locked\r\n");
        builder
    }

    async fn authenticated(mock: Mock) -> MailboxSession {
        let mut session = connected(mock).await;
        session
            .authenticate("bob", "secret", AuthMechanism::Plain)
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_connect_enters_authorization() {
        let session = connected(Builder::new().read(b"+OK ready\r\n").build()).await;
        assert_eq!(session.state(), SessionState::Authorization);
        assert!(session.cached_capabilities().is_none());
    }

    #[tokio::test]
    async fn test_negative_greeting() {
        let mut session = MailboxSession::new(config());
        let err = session
            .connect_with_stream(Builder::new().read(b"-ERR busy\r\n").build())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(mailwire_net::Error::NegativeGreeting(_))
        ));
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[tokio::test]
    async fn test_transaction_commands_rejected_before_auth() {
        // No writes scripted: the mock panics if anything reaches the wire.
        let mut session = connected(Builder::new().read(b"+OK ready\r\n").build()).await;

        let err = session.status().await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                command: "STAT",
                state: SessionState::Authorization
            }
        ));
        assert!(matches!(
            session.list().await.unwrap_err(),
            Error::InvalidState { .. }
        ));
        assert!(matches!(
            session.retrieve(1).await.unwrap_err(),
            Error::InvalidState { .. }
        ));
        assert!(matches!(
            session.top(1, 0).await.unwrap_err(),
            Error::InvalidState { .. }
        ));
        assert!(matches!(
            session.unique_ids().await.unwrap_err(),
            Error::InvalidState { .. }
        ));
        assert!(matches!(
            session.delete(1).await.unwrap_err(),
            Error::InvalidState { .. }
        ));
        assert!(matches!(
            session.noop().await.unwrap_err(),
            Error::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn test_commands_rejected_when_not_connected() {
        let mut session = MailboxSession::new(config());
        let err = session.capabilities().await.unwrap_err();
        assert!(err.to_string().contains("STATE_NOT_CONNECTED"));
        let err = session
            .authenticate("bob", "secret", AuthMechanism::Plain)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                state: SessionState::NotConnected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_authenticate_user_pass() {
        let session = authenticated(logged_in().build()).await;
        assert_eq!(session.state(), SessionState::Transaction);
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password_keeps_state() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"USER bob\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS wrong\r\n")
            .read(b"-ERR invalid password\r\n")
            .build();
        let mut session = connected(mock).await;

        let err = session
            .authenticate("bob", "wrong", AuthMechanism::Plain)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Authentication failed: The password is not valid: invalid password"
        );
        assert_eq!(session.state(), SessionState::Authorization);
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"USER nobody\r\n")
            .read(b"-ERR never heard of mailbox\r\n")
            .build();
        let mut session = connected(mock).await;

        let err = session
            .authenticate("nobody", "x", AuthMechanism::Plain)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("username"));
        assert_eq!(session.state(), SessionState::Authorization);
    }

    #[tokio::test]
    async fn test_authenticate_login() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"+ VXNlcm5hbWU6\r\n")
            .write(b"Ym9i\r\n")
            .read(b"+ UGFzc3dvcmQ6\r\n")
            .write(b"c2VjcmV0\r\n")
            .read(b"+OK logged in\r\n")
            .build();
        let mut session = connected(mock).await;

        session
            .authenticate("bob", "secret", AuthMechanism::Login)
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Transaction);
    }

    #[tokio::test]
    async fn test_authenticate_login_rejected() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"-ERR mechanism not supported\r\n")
            .build();
        let mut session = connected(mock).await;

        let err = session
            .authenticate("bob", "secret", AuthMechanism::Login)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
        assert_eq!(session.state(), SessionState::Authorization);
    }

    #[tokio::test]
    async fn test_authenticate_unsupported_mechanism() {
        let mut session = connected(Builder::new().read(b"+OK ready\r\n").build()).await;
        let err = session
            .authenticate("bob", "secret", AuthMechanism::CramMd5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedMechanism(AuthMechanism::CramMd5)
        ));
    }

    #[tokio::test]
    async fn test_status() {
        let mut builder = logged_in();
        builder.write(b"STAT\r\n").read(b"+OK 3 1200\r\n");
        let mut session = authenticated(builder.build()).await;

        let status = session.status().await.unwrap();
        assert_eq!(
            status,
            MaildropStatus {
                messages: 3,
                size: 1200
            }
        );
    }

    #[tokio::test]
    async fn test_status_malformed() {
        let mut builder = logged_in();
        builder.write(b"STAT\r\n").read(b"+OK lots\r\n");
        let mut session = authenticated(builder.build()).await;

        let err = session.status().await.unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedResponse {
                command: "STAT",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_status_negative() {
        let mut builder = logged_in();
        builder.write(b"STAT\r\n").read(b"-ERR maildrop busy\r\n");
        let mut session = authenticated(builder.build()).await;

        match session.status().await.unwrap_err() {
            Error::NegativeResponse { command, response } => {
                assert_eq!(command, "STAT");
                assert_eq!(response, "-ERR maildrop busy");
            }
            other => panic!("expected NegativeResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_all() {
        let mut builder = logged_in();
        builder
            .write(b"LIST\r\n")
            .read(b"+OK 2 messages (320 octets)\r\n1 120\r\n2 200\r\n.\r\n");
        let mut session = authenticated(builder.build()).await;

        let listing = session.list().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[&1], 120);
        assert_eq!(listing[&2], 200);
    }

    #[tokio::test]
    async fn test_list_empty_maildrop() {
        let mut builder = logged_in();
        builder.write(b"LIST\r\n").read(b"+OK\r\n.\r\n");
        let mut session = authenticated(builder.build()).await;

        assert!(session.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_one() {
        let mut builder = logged_in();
        builder.write(b"LIST 2\r\n").read(b"+OK 2 200\r\n");
        let mut session = authenticated(builder.build()).await;

        assert_eq!(session.list_message(2).await.unwrap(), (2, 200));
    }

    #[tokio::test]
    async fn test_retrieve_destuffs_and_excludes_terminator() {
        let mut builder = logged_in();
        builder
            .write(b"RETR 1\r\n")
            .read(b"+OK 120 octets\r\n")
            .read(b"Subject: hi\r\n\r\n")
            .read(b"..\r\n")
            .read(b"...leading dots\r\n")
            .read(b"bye\r\n.\r\n");
        let mut session = authenticated(builder.build()).await;

        let message = session.retrieve(1).await.unwrap();
        assert_eq!(message, "Subject: hi\r\n\r\n.\r\n..leading dots\r\nbye\r\n");
        assert_eq!(message.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_retrieve_requires_message_number() {
        let mut session = authenticated(logged_in().build()).await;
        let err = session.retrieve(None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::MissingArgument {
                command: "RETR",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_retrieve_negative() {
        let mut builder = logged_in();
        builder
            .write(b"RETR 9\r\n")
            .read(b"-ERR no such message\r\n");
        let mut session = authenticated(builder.build()).await;

        assert!(matches!(
            session.retrieve(9).await.unwrap_err(),
            Error::NegativeResponse { command: "RETR", .. }
        ));
        // The session is still usable.
        assert_eq!(session.state(), SessionState::Transaction);
    }

    #[tokio::test]
    async fn test_delete_reset_noop() {
        let mut builder = logged_in();
        builder
            .write(b"DELE 1\r\n")
            .read(b"+OK message 1 deleted\r\n")
            .write(b"RSET\r\n")
            .read(b"+OK\r\n")
            .write(b"NOOP\r\n")
            .read(b"+OK\r\n")
            .write(b"DELE 1\r\n")
            .read(b"-ERR message 1 already deleted\r\n");
        let mut session = authenticated(builder.build()).await;

        session.delete(1).await.unwrap();
        session.reset().await.unwrap();
        session.noop().await.unwrap();
        match session.delete(1).await.unwrap_err() {
            Error::NegativeResponse { response, .. } => {
                assert_eq!(response, "-ERR message 1 already deleted");
            }
            other => panic!("expected NegativeResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_top_fetches_capabilities_once() {
        let mut builder = logged_in();
        builder
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nTOP\r\nUIDL\r\nUSER\r\n.\r\n")
            .write(b"TOP 1 2\r\n")
            .read(b"+OK\r\nSubject: a\r\n\r\nline one\r\nline two\r\n.\r\n")
            .write(b"TOP 2 0\r\n")
            .read(b"+OK\r\nSubject: b\r\n\r\n.\r\n");
        let mut session = authenticated(builder.build()).await;

        let top = session.top(1, 2).await.unwrap();
        assert_eq!(top, "Subject: a\r\n\r\nline one\r\nline two\r\n");
        assert_eq!(
            session.cached_capabilities().unwrap(),
            &["TOP".to_string(), "UIDL".to_string(), "USER".to_string()]
        );

        let top = session.top(2, 0).await.unwrap();
        assert_eq!(top.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_top_requires_capability() {
        let mut builder = logged_in();
        builder
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nUSER\r\n.\r\n");
        let mut session = authenticated(builder.build()).await;

        let err = session.top(1, 5).await.unwrap_err();
        assert!(matches!(err, Error::Capability(ref c) if c == "TOP"));
    }

    #[tokio::test]
    async fn test_top_requires_line_count() {
        let mut session = authenticated(logged_in().build()).await;
        let err = session.top(1, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::MissingArgument {
                argument: "number of lines",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unique_ids() {
        let mut builder = logged_in();
        builder
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nuidl\r\n.\r\n")
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 whqtswO00WBw418f9t5JxYwZ\r\n2 QhdPYR:00WBw1Ph7x7\r\n.\r\n")
            .write(b"UIDL 2\r\n")
            .read(b"+OK 2 QhdPYR:00WBw1Ph7x7\r\n");
        let mut session = authenticated(builder.build()).await;

        let ids = session.unique_ids().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[&1], "whqtswO00WBw418f9t5JxYwZ");

        let (id, uid) = session.unique_id(2).await.unwrap();
        assert_eq!(id, 2);
        assert_eq!(uid, "QhdPYR:00WBw1Ph7x7");
    }

    #[tokio::test]
    async fn test_capabilities_raw_and_negative() {
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nTOP\r\nSASL PLAIN LOGIN\r\n.\r\n")
            .write(b"CAPA\r\n")
            .read(b"-ERR unknown command\r\n")
            .build();
        let mut session = connected(mock).await;

        assert_eq!(
            session.capabilities_raw().await.unwrap(),
            "TOP\r\nSASL PLAIN LOGIN"
        );
        assert!(matches!(
            session.capabilities().await.unwrap_err(),
            Error::NegativeResponse { command: "CAPA", .. }
        ));
    }

    #[tokio::test]
    async fn test_quit_closes() {
        let mut builder = logged_in();
        builder.write(b"QUIT\r\n").read(b"+OK bye\r\n");
        let mut session = authenticated(builder.build()).await;

        session.quit().await.unwrap();
        assert_eq!(session.state(), SessionState::NotConnected);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_quit_negative_leaves_update() {
        let mut builder = logged_in();
        builder
            .write(b"QUIT\r\n")
            .read(b"-ERR some deleted messages not removed\r\n");
        let mut session = authenticated(builder.build()).await;

        assert!(matches!(
            session.quit().await.unwrap_err(),
            Error::NegativeResponse { command: "QUIT", .. }
        ));
        assert_eq!(session.state(), SessionState::Update);
        session.close();
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[tokio::test]
    async fn test_io_failure_resets_state() {
        let mut builder = logged_in();
        builder.write(b"STAT\r\n").read(b"+OK 3");
        let mut session = authenticated(builder.build()).await;

        let err = session.status().await.unwrap_err();
        assert!(err.is_io());
        assert_eq!(session.state(), SessionState::NotConnected);

        // Fails fast without touching the (closed) transport.
        assert!(matches!(
            session.noop().await.unwrap_err(),
            Error::InvalidState {
                state: SessionState::NotConnected,
                ..
            }
        ));
    }

    #[test]
    fn test_close_never_opened() {
        let mut session = MailboxSession::new(config());
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[test]
    fn test_advertises() {
        assert!(advertises("TOP", "TOP"));
        assert!(advertises("sasl PLAIN", "SASL"));
        assert!(!advertises("STOP", "TOP"));
        assert!(!advertises("", "TOP"));
    }
}
