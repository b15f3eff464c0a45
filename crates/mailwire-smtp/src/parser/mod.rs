//! SMTP response parser.

use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from response lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// Returns `None` if the reply is empty or a line lacks a three-digit code.
#[must_use]
pub fn parse_reply(lines: &[String]) -> Option<Reply> {
    let code = reply_code(lines.first()?)?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        reply_code(line)?;
        // Skip code and separator (e.g., "250-" or "250 ")
        message.push(line.get(4..).unwrap_or_default().to_string());
    }

    Some(Reply::new(code, message))
}

/// Reads the three-digit code at the start of a reply line.
#[must_use]
pub fn reply_code(line: &str) -> Option<ReplyCode> {
    let digits = line.get(..3)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match line.as_bytes().get(3) {
        None | Some(b' ' | b'-') => digits.parse().ok().map(ReplyCode::new),
        Some(_) => None,
    }
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies mark continuation with `-` after the code; any other
/// line ends the reply.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    line.as_bytes().get(3) != Some(&b'-')
}
