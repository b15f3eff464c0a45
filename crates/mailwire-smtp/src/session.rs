//! SMTP submission session.
//!
//! ```text
//!  NotConnected ── connect() ──→ Connected ── authenticate() ──→ Authenticated
//!        ↑                          │                                 │
//!        └──── close / I/O error / quit() / send() ←──────────────────┘
//! ```
//!
//! Every command needs a live session; MAIL, RCPT and DATA additionally need
//! an authenticated one. Both checks run before anything is written.

use base64::Engine;
use mailwire_net::{AuthMechanism, Config, Connection, Io, Protocol, Security};
use tracing::Span;

use crate::command::{self, Command};
use crate::message::Message;
use crate::parser::{is_last_reply_line, parse_reply, reply_code};
use crate::state::{SessionState, StateSet};
use crate::types::{Address, Extension, Reply, ReplyCode};
use crate::{Error, Result};

/// An SMTP submission session over one connection.
#[derive(Debug)]
pub struct SubmissionSession {
    conn: Connection,
    state: SessionState,
    /// EHLO lines; `None` until EHLO has succeeded on this connection.
    capabilities: Option<Vec<String>>,
}

impl SubmissionSession {
    /// Creates an unconnected session.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let span = tracing::info_span!(
            "session",
            protocol = Protocol::Submission.as_str(),
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

    /// Returns the EHLO capability lines, if EHLO has run.
    #[must_use]
    pub fn cached_capabilities(&self) -> Option<&[String]> {
        self.capabilities.as_deref()
    }

    /// Returns the cached capabilities as typed extensions.
    #[must_use]
    pub fn extensions(&self) -> Vec<Extension> {
        self.capabilities
            .iter()
            .flatten()
            .map(|line| Extension::parse(line))
            .collect()
    }

    /// Connects, validates the 220 greeting, and upgrades with STARTTLS when
    /// the security mode asks for it.
    ///
    /// # Errors
    ///
    /// Connection errors, or STARTTLS failures (the connection is then
    /// closed).
    pub async fn connect(&mut self) -> Result<()> {
        let greeting = self.conn.connect(is_greeting_ok).await?;
        self.after_greeting(greeting).await
    }

    /// Like [`connect`](Self::connect), over a caller-supplied transport.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_with_stream<S: Io + 'static>(&mut self, stream: S) -> Result<()> {
        let greeting = self
            .conn
            .connect_with_stream(stream, is_greeting_ok)
            .await?;
        self.after_greeting(greeting).await
    }

    async fn after_greeting(&mut self, greeting: String) -> Result<()> {
        // Multiline greeting: consume the rest of it.
        let mut line = greeting;
        while !is_last_reply_line(&line) {
            line = self.conn.read_line(true).await?;
        }

        self.state = SessionState::Connected;
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
        self.ehlo(None).await?;
        self.command(&Command::StartTls, &[ReplyCode::SERVICE_READY])
            .await?;
        self.conn.upgrade_to_encrypted().await?;
        // RFC 3207: forget everything learned before the upgrade.
        self.capabilities = None;
        Ok(())
    }

    /// Sends HELO, identifying as `domain` or the configured client domain.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] unless the server answers 250.
    pub async fn helo(&mut self, domain: Option<&str>) -> Result<()> {
        let hostname = self.identity(domain);
        self.command(&Command::Helo { hostname }, &[ReplyCode::OK])
            .await?;
        Ok(())
    }

    /// Sends EHLO and returns the capability lines, which also replace the
    /// cache. Every reply line is included, the first one too.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] if any reply line is not 250.
    pub async fn ehlo(&mut self, domain: Option<&str>) -> Result<Vec<String>> {
        let hostname = self.identity(domain);
        self.write_command(&Command::Ehlo { hostname }).await?;

        let lines = self.read_reply_lines().await?;
        for line in &lines {
            match reply_code(line) {
                Some(ReplyCode::OK) => {}
                Some(code) => {
                    return Err(Error::NegativeResponse {
                        command: "EHLO",
                        code: code.as_u16(),
                        response: lines.join("\n"),
                    });
                }
                None => {
                    return Err(Error::MalformedResponse {
                        command: "EHLO",
                        response: lines.join("\n"),
                    });
                }
            }
        }

        let capabilities: Vec<String> = lines
            .iter()
            .map(|line| line.get(4..).unwrap_or_default().to_string())
            .collect();
        self.capabilities = Some(capabilities.clone());
        Ok(capabilities)
    }

    /// Authenticates and enters AUTHENTICATED.
    ///
    /// `Plain` sends `AUTH PLAIN` with an initial response; `Login` runs the
    /// AUTH LOGIN exchange. On failure the session stays CONNECTED.
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
        self.check_allowed("AUTH", StateSet::CONNECTED)?;

        match mechanism {
            AuthMechanism::Plain => self.auth_plain(user, secret).await?,
            AuthMechanism::Login => self.auth_login(user, secret).await?,
            other => return Err(Error::UnsupportedMechanism(other)),
        }

        self.state = SessionState::Authenticated;
        tracing::info!(parent: self.conn.span(), %mechanism, "Authenticated");
        Ok(())
    }

    async fn auth_plain(&mut self, user: &str, secret: &str) -> Result<()> {
        let engine = base64::engine::general_purpose::STANDARD;
        let command = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(engine.encode(format!("\0{user}\0{secret}"))),
        };

        let reply = self.exchange(&command).await?;
        if reply.code != ReplyCode::AUTH_SUCCEEDED {
            return Err(Error::Authentication(format!(
                "The server rejected the credentials: {reply}"
            )));
        }
        Ok(())
    }

    async fn auth_login(&mut self, user: &str, secret: &str) -> Result<()> {
        let engine = base64::engine::general_purpose::STANDARD;

        let reply = self
            .exchange(&Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            })
            .await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Err(Error::Authentication(format!(
                "The server returned a negative response to the AUTH LOGIN command: {reply}"
            )));
        }

        let reply = self
            .exchange(&Command::AuthResponse {
                payload: engine.encode(user),
            })
            .await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Err(Error::Authentication(format!(
                "The server did not accept the username: {reply}"
            )));
        }

        let reply = self
            .exchange(&Command::AuthResponse {
                payload: engine.encode(secret),
            })
            .await?;
        if reply.code != ReplyCode::AUTH_SUCCEEDED {
            return Err(Error::Authentication(format!(
                "The server did not accept the password: {reply}"
            )));
        }
        Ok(())
    }

    /// Starts a transaction with `MAIL FROM:<reverse_path>`.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] unless the server answers 250.
    pub async fn mail(&mut self, reverse_path: &Address) -> Result<()> {
        self.command(
            &Command::MailFrom {
                from: reverse_path.clone(),
            },
            &[ReplyCode::OK],
        )
        .await?;
        Ok(())
    }

    /// Adds a recipient with `RCPT TO:<forward_path>`.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] unless the server answers 250 or 251.
    pub async fn rcpt(&mut self, forward_path: &Address) -> Result<()> {
        self.command(
            &Command::RcptTo {
                to: forward_path.clone(),
            },
            &[ReplyCode::OK, ReplyCode::FORWARD],
        )
        .await?;
        Ok(())
    }

    /// Sends DATA, the dot-stuffed payload and the terminating `.` line.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] unless the server answers 354 to DATA
    /// and 250 after the payload.
    pub async fn data(&mut self, payload: &str) -> Result<()> {
        self.command(&Command::Data, &[ReplyCode::START_DATA])
            .await?;

        let stuffed = command::dot_stuff(payload);
        if !payload.is_empty() {
            let shown = format!("<{} octets>", stuffed.len());
            self.conn.write_sensitive_line(&stuffed, &shown).await?;
        }
        self.conn.write_line(".").await?;

        let reply = self.read_reply("DATA").await?;
        if reply.code == ReplyCode::OK {
            Ok(())
        } else {
            Err(negative("DATA", &reply))
        }
    }

    /// Aborts the current transaction.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] unless the server answers 250.
    pub async fn reset(&mut self) -> Result<()> {
        self.command(&Command::Rset, &[ReplyCode::OK]).await?;
        Ok(())
    }

    /// Keeps the session alive.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] unless the server answers 250.
    pub async fn noop(&mut self) -> Result<()> {
        self.command(&Command::Noop, &[ReplyCode::OK]).await?;
        Ok(())
    }

    /// Asks the server whether `user` is a deliverable mailbox.
    ///
    /// Runs EHLO first if no capabilities are cached. A refusal is an
    /// answer, not an error: it returns `false`.
    ///
    /// # Errors
    ///
    /// [`Error::Capability`] if VRFY is not advertised.
    pub async fn verify(&mut self, user: &str) -> Result<bool> {
        self.check_allowed("VRFY", StateSet::CONNECTED_OR_AUTHENTICATED)?;
        if self.capabilities.is_none() {
            self.ehlo(None).await?;
        }

        let advertised = self
            .capabilities
            .iter()
            .flatten()
            .any(|line| Extension::advertises(line, "VRFY"));
        if !advertised {
            return Err(Error::Capability("VRFY".into()));
        }

        let reply = self
            .exchange(&Command::Vrfy {
                address: user.to_string(),
            })
            .await?;
        Ok(reply.is_one_of(&[
            ReplyCode::OK,
            ReplyCode::FORWARD,
            ReplyCode::CANNOT_VERIFY,
        ]))
    }

    /// Sends QUIT and closes the connection once the server answers 221.
    ///
    /// # Errors
    ///
    /// [`Error::NegativeResponse`] on any other reply; the connection stays
    /// open.
    pub async fn quit(&mut self) -> Result<()> {
        self.command(&Command::Quit, &[ReplyCode::CLOSING]).await?;
        self.close();
        Ok(())
    }

    /// Submits `message` in one transaction and closes the connection.
    ///
    /// Issues MAIL with the reverse path, RCPT for every `to`, `cc` and `bcc`
    /// recipient in that order, then DATA with the rendered message.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMessage`] before any I/O if the message has no author
    /// or no recipients; otherwise the first failing step's error.
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let (reverse_path, recipients) = message.envelope()?;
        self.check_allowed("MAIL", StateSet::AUTHENTICATED)?;

        self.mail(reverse_path).await?;
        for recipient in recipients {
            self.rcpt(recipient).await?;
        }
        self.data(&message.render()).await?;

        tracing::info!(parent: self.conn.span(), "Message submitted");
        self.close();
        Ok(())
    }

    /// Drops the connection without QUIT. No-op if never opened.
    pub fn close(&mut self) {
        self.conn.close();
        self.state = SessionState::NotConnected;
        self.capabilities = None;
    }

    fn identity(&self, domain: Option<&str>) -> String {
        domain.map_or_else(
            || self.conn.config().client_domain.clone(),
            ToString::to_string,
        )
    }

    fn check_allowed(&self, command: &'static str, allowed: StateSet) -> Result<()> {
        let state = self.state();
        if allowed.contains(state) {
            Ok(())
        } else {
            Err(Error::InvalidState { command, state })
        }
    }

    /// Checks the state and writes the command line.
    async fn write_command(&mut self, command: &Command) -> Result<()> {
        self.check_allowed(command.name(), command.allowed_states())?;

        let line = command.serialize();
        if command.is_sensitive() {
            self.conn
                .write_sensitive_line(&line, &command.redacted())
                .await?;
        } else {
            self.conn.write_line(&line).await?;
        }
        Ok(())
    }

    /// Sends a command and returns whatever the server replied.
    async fn exchange(&mut self, command: &Command) -> Result<Reply> {
        self.write_command(command).await?;
        self.read_reply(command.name()).await
    }

    /// Sends a command whose reply code must be one of `expected`.
    async fn command(&mut self, command: &Command, expected: &[ReplyCode]) -> Result<Reply> {
        let reply = self.exchange(command).await?;
        if reply.is_one_of(expected) {
            Ok(reply)
        } else {
            Err(negative(command.name(), &reply))
        }
    }

    async fn read_reply(&mut self, command: &'static str) -> Result<Reply> {
        let lines = self.read_reply_lines().await?;
        parse_reply(&lines).ok_or_else(|| Error::MalformedResponse {
            command,
            response: lines.join("\n"),
        })
    }

    async fn read_reply_lines(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.conn.read_line(true).await?;
            let last = is_last_reply_line(&line);
            lines.push(line);
            if last {
                return Ok(lines);
            }
        }
    }
}

fn is_greeting_ok(line: &str) -> bool {
    reply_code(line) == Some(ReplyCode::SERVICE_READY)
}

fn negative(command: &'static str, reply: &Reply) -> Error {
    Error::NegativeResponse {
        command,
        code: reply.code.as_u16(),
        response: reply.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::Mailbox;
    use chrono::{TimeZone, Utc};
    use tokio_test::io::{Builder, Mock};

    fn config() -> Config {
        Config::new("smtp.example.com", 587, Security::None).unwrap()
    }

    async fn connected(mock: Mock) -> SubmissionSession {
        let mut session = SubmissionSession::new(config());
        session.connect_with_stream(mock).await.unwrap();
        session
    }

    /// Greeting plus a successful AUTH PLAIN as bob/secret.
    fn logged_in() -> Builder {
        let mut builder = Builder::new();
        builder
            .read(b"220 smtp.example.com ESMTP\r\n")
            .write(b"AUTH PLAIN AGJvYgBzZWNyZXQ=\r\n")
            .read(b"235 2.7.0 Authentication successful\r\n");
        builder
    }

    async fn authenticated(mock: Mock) -> SubmissionSession {
        let mut session = connected(mock).await;
        session
            .authenticate("bob", "secret", AuthMechanism::Plain)
            .await
            .unwrap();
        session
    }

    fn address(addr: &str) -> Address {
        Address::new(addr).unwrap()
    }

    #[tokio::test]
    async fn test_connect_enters_connected() {
        let session = connected(
            Builder::new()
                .read(b"220-smtp.example.com ESMTP\r\n220 no UCE\r\n")
                .build(),
        )
        .await;
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.cached_capabilities().is_none());
    }

    #[tokio::test]
    async fn test_negative_greeting() {
        let mut session = SubmissionSession::new(config());
        let err = session
            .connect_with_stream(Builder::new().read(b"554 no service\r\n").build())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(mailwire_net::Error::NegativeGreeting(ref g)) if g == "554 no service"
        ));
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[tokio::test]
    async fn test_ehlo_collects_capabilities() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"EHLO test\r\n")
            .read(b"250-AUTH PLAIN\r\n250-SIZE 100\r\n250 PIPELINING\r\n")
            .build();
        let mut session = connected(mock).await;

        let capabilities = session.ehlo(Some("test")).await.unwrap();
        assert_eq!(capabilities, vec!["AUTH PLAIN", "SIZE 100", "PIPELINING"]);
        assert_eq!(session.cached_capabilities().unwrap().len(), 3);
        assert_eq!(
            session.extensions(),
            vec![
                Extension::Auth(vec![AuthMechanism::Plain]),
                Extension::Size(Some(100)),
                Extension::Pipelining
            ]
        );
    }

    #[tokio::test]
    async fn test_ehlo_negative() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"502 5.5.1 EHLO not supported\r\n")
            .build();
        let mut session = connected(mock).await;

        let err = session.ehlo(None).await.unwrap_err();
        assert_eq!(err.code(), Some(502));
        assert!(err.is_permanent());
        assert!(session.cached_capabilities().is_none());
    }

    #[tokio::test]
    async fn test_helo_uses_client_domain() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"HELO localhost\r\n")
            .read(b"250 smtp.example.com\r\n")
            .write(b"HELO client.example.org\r\n")
            .read(b"501 bad domain\r\n")
            .build();
        let mut session = connected(mock).await;

        session.helo(None).await.unwrap();
        let err = session.helo(Some("client.example.org")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::NegativeResponse {
                command: "HELO",
                code: 501,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_authenticate_plain() {
        let session = authenticated(logged_in().build()).await;
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_authenticate_plain_rejected_keeps_state() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"AUTH PLAIN AGJvYgBzZWNyZXQ=\r\n")
            .read(b"535 5.7.8 Authentication credentials invalid\r\n")
            .build();
        let mut session = connected(mock).await;

        let err = session
            .authenticate("bob", "secret", AuthMechanism::Plain)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Authentication(ref m) if m.contains("535")));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_authenticate_login() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"Ym9i\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"c2VjcmV0\r\n")
            .read(b"235 ok\r\n")
            .build();
        let mut session = connected(mock).await;

        session
            .authenticate("bob", "secret", AuthMechanism::Login)
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_authenticate_login_bad_password() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"AUTH LOGIN\r\n")
            .read(b"334 VXNlcm5hbWU6\r\n")
            .write(b"Ym9i\r\n")
            .read(b"334 UGFzc3dvcmQ6\r\n")
            .write(b"c2VjcmV0\r\n")
            .read(b"535 nope\r\n")
            .build();
        let mut session = connected(mock).await;

        let err = session
            .authenticate("bob", "secret", AuthMechanism::Login)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("password"));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_authenticate_unsupported_mechanism() {
        let mut session = connected(Builder::new().read(b"220 ready\r\n").build()).await;
        let err = session
            .authenticate("bob", "token", AuthMechanism::XOAuth2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedMechanism(AuthMechanism::XOAuth2)
        ));
    }

    #[tokio::test]
    async fn test_transaction_requires_authentication() {
        // No writes scripted: anything reaching the wire fails the test.
        let mut session = connected(Builder::new().read(b"220 ready\r\n").build()).await;

        let err = session.mail(&address("a@example.com")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState {
                command: "MAIL",
                state: SessionState::Connected
            }
        ));
        assert!(matches!(
            session.rcpt(&address("b@example.com")).await.unwrap_err(),
            Error::InvalidState { .. }
        ));
        assert!(matches!(
            session.data("hi").await.unwrap_err(),
            Error::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let mut session = SubmissionSession::new(config());
        let err = session.noop().await.unwrap_err();
        assert!(err.to_string().contains("STATE_NOT_CONNECTED"));
        assert!(matches!(
            session.ehlo(None).await.unwrap_err(),
            Error::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn test_rcpt_accepts_forward() {
        let mut builder = logged_in();
        builder
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<bob@example.org>\r\n")
            .read(b"251 User not local; will forward\r\n");
        let mut session = authenticated(builder.build()).await;

        session.mail(&address("alice@example.com")).await.unwrap();
        session.rcpt(&address("bob@example.org")).await.unwrap();
    }

    #[tokio::test]
    async fn test_data_dot_stuffs_payload() {
        let mut builder = logged_in();
        builder
            .write(b"DATA\r\n")
            .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
            .write(b"line one\r\n..\r\n..hidden\r\nlast\r\n")
            .write(b".\r\n")
            .read(b"250 2.0.0 queued\r\n");
        let mut session = authenticated(builder.build()).await;

        session
            .data("line one\n.\n.hidden\nlast\n")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_data_keeps_lone_blank_line() {
        let mut builder = logged_in();
        builder
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"\r\n")
            .write(b".\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b".\r\n")
            .read(b"250 ok\r\n");
        let mut session = authenticated(builder.build()).await;

        session.data("\n").await.unwrap();
        session.data("").await.unwrap();
    }

    #[tokio::test]
    async fn test_data_rejected_after_payload() {
        let mut builder = logged_in();
        builder
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(b"body\r\n.\r\n")
            .read(b"552 5.3.4 message too big\r\n");
        let mut session = authenticated(builder.build()).await;

        let err = session.data("body").await.unwrap_err();
        assert!(matches!(
            err,
            Error::NegativeResponse {
                command: "DATA",
                code: 552,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_reset_and_noop() {
        let mut builder = logged_in();
        builder
            .write(b"RSET\r\n")
            .read(b"250 flushed\r\n")
            .write(b"NOOP\r\n")
            .read(b"421 shutting down\r\n");
        let mut session = authenticated(builder.build()).await;

        session.reset().await.unwrap();
        let err = session.noop().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_verify_runs_ehlo_lazily() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-smtp.example.com\r\n250 VRFY\r\n")
            .write(b"VRFY nobody\r\n")
            .read(b"550 no such user\r\n")
            .write(b"VRFY bob\r\n")
            .read(b"252 cannot verify, will attempt delivery\r\n")
            .build();
        let mut session = connected(mock).await;

        assert!(!session.verify("nobody").await.unwrap());
        assert!(session.verify("bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_requires_capability() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-smtp.example.com\r\n250 PIPELINING\r\n")
            .build();
        let mut session = connected(mock).await;

        let err = session.verify("bob").await.unwrap_err();
        assert!(matches!(err, Error::Capability(ref c) if c == "VRFY"));
    }

    #[tokio::test]
    async fn test_quit() {
        let mock = Builder::new()
            .read(b"220 ready\r\n")
            .write(b"QUIT\r\n")
            .read(b"500 what\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build();
        let mut session = connected(mock).await;

        assert!(session.quit().await.is_err());
        assert!(session.is_connected());
        session.quit().await.unwrap();
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[tokio::test]
    async fn test_send_without_recipients_does_no_io() {
        let mut session = authenticated(logged_in().build()).await;
        let message = Message::new()
            .from(Mailbox::new("alice@example.com").unwrap())
            .subject("nobody to send to");

        let err = session.send(&message).await.unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn test_send_aborts_on_rejected_recipient() {
        let mut builder = logged_in();
        builder
            .write(b"MAIL FROM:<alice@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<x@example.org>\r\n")
            .read(b"550 no such user\r\n");
        let mut session = authenticated(builder.build()).await;

        let message = Message::new()
            .from(Mailbox::new("alice@example.com").unwrap())
            .to(Mailbox::new("x@example.org").unwrap())
            .to(Mailbox::new("y@example.org").unwrap());

        match session.send(&message).await.unwrap_err() {
            Error::NegativeResponse {
                command,
                code,
                response,
            } => {
                assert_eq!(command, "RCPT");
                assert_eq!(code, 550);
                assert_eq!(response, "550 no such user");
            }
            other => panic!("expected NegativeResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_full_transaction() {
        let message = Message::new()
            .from(Mailbox::with_name("Alice", "alice@example.com").unwrap())
            .return_path(address("bounces@example.com"))
            .to(Mailbox::new("to@example.org").unwrap())
            .cc(Mailbox::new("cc@example.org").unwrap())
            .bcc(Mailbox::new("bcc@example.org").unwrap())
            .subject("Hi")
            .date(Utc.with_ymd_and_hms(2010, 3, 14, 15, 9, 26).unwrap())
            .message_id("<1@example.com>")
            .body("Hello\n.\nBye");

        let mut builder = logged_in();
        builder
            .write(b"MAIL FROM:<bounces@example.com>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<to@example.org>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<cc@example.org>\r\n")
            .read(b"250 ok\r\n")
            .write(b"RCPT TO:<bcc@example.org>\r\n")
            .read(b"250 ok\r\n")
            .write(b"DATA\r\n")
            .read(b"354 go ahead\r\n")
            .write(
                b"From: \"Alice\" <alice@example.com>\r\n\
                  To: <to@example.org>\r\n\
                  Cc: <cc@example.org>\r\n\
                  Subject: Hi\r\n\
                  Date: Sun, 14 Mar 2010 15:09:26 +0000\r\n\
                  Message-ID: <1@example.com>\r\n\
                  \r\n\
                  Hello\r\n..\r\nBye\r\n",
            )
            .write(b".\r\n")
            .read(b"250 2.0.0 Ok: queued\r\n");
        let mut session = authenticated(builder.build()).await;

        session.send(&message).await.unwrap();
        assert!(!session.is_connected());
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[tokio::test]
    async fn test_io_failure_resets_state() {
        let mut builder = logged_in();
        builder.write(b"NOOP\r\n").read(b"25");
        let mut session = authenticated(builder.build()).await;

        let err = session.noop().await.unwrap_err();
        assert!(err.is_io());
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[test]
    fn test_close_never_opened() {
        let mut session = SubmissionSession::new(config());
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::NotConnected);
    }

    #[test]
    fn test_greeting_predicate() {
        assert!(is_greeting_ok("220 smtp.example.com ESMTP"));
        assert!(is_greeting_ok("220-multi"));
        assert!(!is_greeting_ok("554 go away"));
        assert!(!is_greeting_ok("+OK"));
    }
}
