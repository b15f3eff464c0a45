//! POP3 response helpers.
//!
//! Every POP3 response starts with a status indicator: `+OK` or `-ERR`.
//! Multiline bodies follow a positive first line and end with a line holding
//! a single `.`; body lines that begin with `.` arrive byte-stuffed (`..`).

/// Positive status indicator.
pub const POSITIVE: &str = "+OK";

/// Negative status indicator.
pub const NEGATIVE: &str = "-ERR";

/// Marks the end of a multiline body.
pub const TERMINATION_OCTET: char = '.';

/// Maildrop summary returned by STAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaildropStatus {
    /// Number of messages in the maildrop.
    pub messages: u32,
    /// Total size of the maildrop in octets.
    pub size: u64,
}

/// Returns true if the line starts with `+OK`.
#[must_use]
pub fn is_positive(line: &str) -> bool {
    line.starts_with(POSITIVE)
}

/// Returns true for a SASL continuation (`+ <challenge>`).
#[must_use]
pub fn is_continuation(line: &str) -> bool {
    line.starts_with('+') && !is_positive(line)
}

/// Returns true if the line ends a multiline body: it begins with a single
/// termination octet. A doubled octet is stuffed content.
#[must_use]
pub fn is_termination(line: &str) -> bool {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut chars = line.chars();
    chars.next() == Some(TERMINATION_OCTET) && chars.next() != Some(TERMINATION_OCTET)
}

/// Removes byte-stuffing from a body line.
#[must_use]
pub fn destuff(line: &str) -> &str {
    if line.starts_with("..") {
        &line[1..]
    } else {
        line
    }
}

/// Text after the status indicator.
#[must_use]
pub fn status_text(line: &str) -> &str {
    line.strip_prefix(POSITIVE)
        .or_else(|| line.strip_prefix(NEGATIVE))
        .unwrap_or(line)
        .trim()
}

/// Parses `+OK <count> <size>`.
#[must_use]
pub fn parse_stat(line: &str) -> Option<MaildropStatus> {
    let mut fields = line.strip_prefix(POSITIVE)?.split_whitespace();
    let messages = fields.next()?.parse().ok()?;
    let size = fields.next()?.parse().ok()?;
    Some(MaildropStatus { messages, size })
}

/// Parses a scan listing `<n> <size>`, with or without a leading `+OK`.
#[must_use]
pub fn parse_scan_line(line: &str) -> Option<(u32, u64)> {
    let mut fields = strip_indicator(line).split_whitespace();
    let id = fields.next()?.parse().ok()?;
    let size = fields.next()?.parse().ok()?;
    Some((id, size))
}

/// Parses a unique-id listing `<n> <uid>`, with or without a leading `+OK`.
#[must_use]
pub fn parse_uid_line(line: &str) -> Option<(u32, String)> {
    let mut fields = strip_indicator(line).split_whitespace();
    let id = fields.next()?.parse().ok()?;
    let uid = fields.next()?;
    Some((id, uid.to_string()))
}

fn strip_indicator(line: &str) -> &str {
    line.strip_prefix(POSITIVE).unwrap_or(line)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_status_indicators() {
        assert!(is_positive("+OK ready"));
        assert!(is_positive("+OK"));
        assert!(!is_positive("-ERR nope"));
        assert!(!is_positive(" +OK"));

        assert!(is_continuation("+ VXNlcm5hbWU6"));
        assert!(is_continuation("+"));
        assert!(!is_continuation("+OK"));
        assert!(!is_continuation("-ERR"));
    }

    #[test]
    fn test_termination() {
        assert!(is_termination("."));
        assert!(is_termination(".\r\n"));
        assert!(!is_termination("..\r\n"));
        assert!(!is_termination("..hidden"));
        assert!(!is_termination("text."));
        assert!(!is_termination(""));
    }

    #[test]
    fn test_destuff() {
        assert_eq!(destuff(".."), ".");
        assert_eq!(destuff("...more"), "..more");
        assert_eq!(destuff("plain"), "plain");
        assert_eq!(destuff(""), "");
    }

    #[test]
    fn test_status_text() {
        assert_eq!(status_text("+OK maildrop locked"), "maildrop locked");
        assert_eq!(status_text("-ERR no such message"), "no such message");
        assert_eq!(status_text("garbage"), "garbage");
    }

    #[test]
    fn test_parse_stat() {
        assert_eq!(
            parse_stat("+OK 3 1200"),
            Some(MaildropStatus {
                messages: 3,
                size: 1200
            })
        );
        assert_eq!(parse_stat("+OK 0 0").unwrap().messages, 0);
        assert_eq!(parse_stat("+OK three 1200"), None);
        assert_eq!(parse_stat("+OK 3"), None);
        assert_eq!(parse_stat("-ERR 3 1200"), None);
    }

    #[test]
    fn test_parse_scan_line() {
        assert_eq!(parse_scan_line("1 120"), Some((1, 120)));
        assert_eq!(parse_scan_line("+OK 2 200"), Some((2, 200)));
        assert_eq!(parse_scan_line("2 200 extra"), Some((2, 200)));
        assert_eq!(parse_scan_line("x 200"), None);
        assert_eq!(parse_scan_line("2"), None);
    }

    #[test]
    fn test_parse_uid_line() {
        assert_eq!(
            parse_uid_line("1 whqtswO00WBw418f9t5JxYwZ"),
            Some((1, "whqtswO00WBw418f9t5JxYwZ".to_string()))
        );
        assert_eq!(
            parse_uid_line("+OK 2 QhdPYR:00WBw1Ph7x7"),
            Some((2, "QhdPYR:00WBw1Ph7x7".to_string()))
        );
        assert_eq!(parse_uid_line("2"), None);
    }

    fn stuff(line: &str) -> String {
        if line.starts_with('.') {
            format!(".{line}")
        } else {
            line.to_string()
        }
    }

    proptest! {
        #[test]
        fn stuffed_lines_never_terminate(line in "[.a-z ]{0,12}") {
            let stuffed = stuff(&line);
            prop_assert!(!is_termination(&stuffed));
        }

        #[test]
        fn destuff_inverts_stuffing(line in "[.a-z ]{0,12}") {
            let stuffed = stuff(&line);
            prop_assert_eq!(destuff(&stuffed), line.as_str());
        }
    }
}
