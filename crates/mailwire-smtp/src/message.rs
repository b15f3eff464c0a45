//! Outgoing message builder.
//!
//! A [`Message`] carries the envelope (sender, return path and the three
//! recipient lists) and renders to RFC 5322 text for the DATA phase.
//! Blind recipients are part of the envelope only; they never appear in the
//! rendered headers.

use std::fmt::Write as _;

use base64::Engine;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Address, Mailbox};

const CRLF: &str = "\r\n";

/// Longest input slice per encoded word. A 39-byte slice encodes to a
/// 64-character word, which keeps `Subject: ` plus one word under 78.
const ENCODED_WORD_CHUNK: usize = 39;

/// Message priority, rendered as `X-Priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    /// Priority 1.
    pub const HIGHEST: Self = Self(1);
    /// Priority 2.
    pub const HIGH: Self = Self(2);
    /// Priority 3.
    pub const NORMAL: Self = Self(3);
    /// Priority 4.
    pub const LOW: Self = Self(4);
    /// Priority 5.
    pub const LOWEST: Self = Self(5);

    /// Creates a priority, clamping `level` into 1..=5.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped to 1..=5
    pub fn new(level: i32) -> Self {
        Self(level.clamp(1, 5) as u8)
    }

    /// Returns the numeric level.
    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }

    /// Returns the level's name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            1 => "Highest",
            2 => "High",
            4 => "Low",
            5 => "Lowest",
            _ => "Normal",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// An outgoing message.
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Author (`From`).
    pub from: Option<Mailbox>,
    /// Agent that submitted on the author's behalf (`Sender`).
    pub sender: Option<Mailbox>,
    /// Where replies go (`Reply-To`).
    pub reply_to: Option<Mailbox>,
    /// Envelope sender for bounces; overrides `sender` and `from`.
    pub return_path: Option<Address>,
    /// Primary recipients.
    pub to: Vec<Mailbox>,
    /// Courtesy copies.
    pub cc: Vec<Mailbox>,
    /// Blind copies.
    pub bcc: Vec<Mailbox>,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Extra headers, rendered after the standard ones.
    pub headers: Vec<(String, String)>,
    /// `X-Priority`.
    pub priority: Option<Priority>,
    /// `User-Agent`.
    pub user_agent: Option<String>,
    /// `Message-ID`, including angle brackets. Generated when absent.
    pub message_id: Option<String>,
    /// `Date`. The render time when absent.
    pub date: Option<DateTime<Utc>>,
}

impl Message {
    /// Creates an empty message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the author.
    #[must_use]
    pub fn from(mut self, mailbox: Mailbox) -> Self {
        self.from = Some(mailbox);
        self
    }

    /// Sets the submitting agent.
    #[must_use]
    pub fn sender(mut self, mailbox: Mailbox) -> Self {
        self.sender = Some(mailbox);
        self
    }

    /// Sets the reply address.
    #[must_use]
    pub fn reply_to(mut self, mailbox: Mailbox) -> Self {
        self.reply_to = Some(mailbox);
        self
    }

    /// Sets the envelope sender.
    #[must_use]
    pub fn return_path(mut self, address: Address) -> Self {
        self.return_path = Some(address);
        self
    }

    /// Adds a primary recipient.
    #[must_use]
    pub fn to(mut self, mailbox: Mailbox) -> Self {
        self.to.push(mailbox);
        self
    }

    /// Adds a courtesy copy recipient.
    #[must_use]
    pub fn cc(mut self, mailbox: Mailbox) -> Self {
        self.cc.push(mailbox);
        self
    }

    /// Adds a blind copy recipient.
    #[must_use]
    pub fn bcc(mut self, mailbox: Mailbox) -> Self {
        self.bcc.push(mailbox);
        self
    }

    /// Sets the subject, trimmed.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into().trim().to_string();
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a custom header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the message id (with angle brackets).
    #[must_use]
    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Sets the date.
    #[must_use]
    pub const fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Reverse path: the return path, else the sender, else the author.
    #[must_use]
    pub fn reverse_path(&self) -> Option<&Address> {
        self.return_path
            .as_ref()
            .or_else(|| self.sender.as_ref().map(|m| &m.address))
            .or_else(|| self.from.as_ref().map(|m| &m.address))
    }

    /// Every envelope recipient: `to`, then `cc`, then `bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &Address> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(|m| &m.address)
    }

    /// Returns the reverse path and recipients for a transaction.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMessage`] without an author or without recipients.
    pub fn envelope(&self) -> Result<(&Address, Vec<&Address>)> {
        if self.from.is_none() {
            return Err(Error::InvalidMessage(
                "The message does not have a from address".into(),
            ));
        }
        let recipients: Vec<&Address> = self.recipients().collect();
        if recipients.is_empty() {
            return Err(Error::InvalidMessage(
                "The message must have a recipient".into(),
            ));
        }
        let reverse_path = self.reverse_path().ok_or_else(|| {
            Error::InvalidMessage("The message does not have a from address".into())
        })?;
        Ok((reverse_path, recipients))
    }

    /// Renders headers, a blank line, then the body, CRLF-delimited.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 512);

        if let Some(from) = &self.from {
            push_header(&mut out, "From", &from.to_string());
        }
        if let Some(sender) = &self.sender {
            push_header(&mut out, "Sender", &sender.to_string());
        }
        if let Some(reply_to) = &self.reply_to {
            push_header(&mut out, "Reply-To", &reply_to.to_string());
        }
        if !self.to.is_empty() {
            push_header(&mut out, "To", &join_mailboxes(&self.to));
        }
        if !self.cc.is_empty() {
            push_header(&mut out, "Cc", &join_mailboxes(&self.cc));
        }
        if let Some(priority) = self.priority {
            push_header(&mut out, "X-Priority", &priority.to_string());
        }
        if let Some(user_agent) = &self.user_agent {
            push_header(&mut out, "User-Agent", &single_line(user_agent));
        }
        push_header(&mut out, "Subject", &encode_word(&single_line(&self.subject)));

        let date = self.date.unwrap_or_else(Utc::now);
        push_header(&mut out, "Date", &date.to_rfc2822());

        let message_id = self
            .message_id
            .clone()
            .unwrap_or_else(|| self.generate_message_id());
        push_header(&mut out, "Message-ID", &single_line(&message_id));

        for (name, value) in &self.headers {
            push_header(&mut out, name, &encode_word(&single_line(value)));
        }

        out.push_str(CRLF);
        out.push_str(&self.body);
        out
    }

    fn generate_message_id(&self) -> String {
        let domain = self
            .sender
            .as_ref()
            .or(self.from.as_ref())
            .map_or("localhost", |m| m.address.domain());
        format!("<{}@{domain}>", Uuid::new_v4())
    }
}

/// Appends `name: value`. The value must already be free of bare line
/// breaks; the only CRLFs it may carry are folds from [`encode_word`].
fn push_header(out: &mut String, name: &str, value: &str) {
    let name: String = name.chars().filter(|c| c.is_ascii_graphic() && *c != ':').collect();
    let _ = write!(out, "{name}: {value}{CRLF}");
}

/// Replaces CR and LF with spaces so caller text cannot start a new header.
pub(crate) fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

fn join_mailboxes(mailboxes: &[Mailbox]) -> String {
    mailboxes
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Encodes header text as RFC 2047 base64 encoded words when it is not
/// plain ASCII. Long text is split across folded words.
pub(crate) fn encode_word(text: &str) -> String {
    if text.is_ascii() && !text.contains("=?") {
        return text.to_string();
    }

    let engine = base64::engine::general_purpose::STANDARD;
    let mut words = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + ENCODED_WORD_CHUNK).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        words.push(format!("=?UTF-8?B?{}?=", engine.encode(&text[start..end])));
        start = end;
    }
    words.join("\r\n ")
}
