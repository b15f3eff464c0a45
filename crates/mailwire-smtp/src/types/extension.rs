//! SMTP extension types.

use mailwire_net::AuthMechanism;

/// SMTP extensions discovered from EHLO response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade
    StartTls,
    /// AUTH - Authentication
    Auth(Vec<AuthMechanism>),
    /// SIZE - Maximum message size
    Size(Option<usize>),
    /// 8BITMIME - 8-bit MIME transport
    EightBitMime,
    /// PIPELINING - Command pipelining
    Pipelining,
    /// SMTPUTF8 - UTF-8 email addresses
    SmtpUtf8,
    /// DSN - Delivery status notifications
    Dsn,
    /// VRFY - Address verification
    Vrfy,
    /// Anything else, verbatim
    Unknown(String),
}

impl Extension {
    /// Parses an extension line from EHLO response.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(keyword) = parts.first() else {
            return Self::Unknown(line.to_string());
        };

        match keyword.to_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => {
                let mechanisms = parts[1..]
                    .iter()
                    .filter_map(|m| AuthMechanism::parse(m))
                    .collect();
                Self::Auth(mechanisms)
            }
            "SIZE" => {
                let size = parts.get(1).and_then(|s| s.parse().ok());
                Self::Size(size)
            }
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "SMTPUTF8" => Self::SmtpUtf8,
            "DSN" => Self::Dsn,
            "VRFY" => Self::Vrfy,
            _ => Self::Unknown(line.to_string()),
        }
    }

    /// Returns true if an advertised capability line names `keyword`.
    #[must_use]
    pub fn advertises(line: &str, keyword: &str) -> bool {
        line.split_whitespace()
            .next()
            .is_some_and(|token| token.eq_ignore_ascii_case(keyword))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_starttls() {
        assert_eq!(Extension::parse("STARTTLS"), Extension::StartTls);
        assert_eq!(Extension::parse("starttls"), Extension::StartTls);
    }

    #[test]
    fn parse_auth() {
        let Extension::Auth(mechs) = Extension::parse("AUTH PLAIN LOGIN XOAUTH2 GSSAPI") else {
            panic!("Expected Auth variant");
        };
        assert_eq!(
            mechs,
            vec![
                AuthMechanism::Plain,
                AuthMechanism::Login,
                AuthMechanism::XOAuth2
            ]
        );
    }

    #[test]
    fn parse_size() {
        assert_eq!(
            Extension::parse("SIZE 52428800"),
            Extension::Size(Some(52_428_800))
        );
        assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
    }

    #[test]
    fn parse_flags() {
        assert_eq!(Extension::parse("8BITMIME"), Extension::EightBitMime);
        assert_eq!(Extension::parse("PIPELINING"), Extension::Pipelining);
        assert_eq!(Extension::parse("SMTPUTF8"), Extension::SmtpUtf8);
        assert_eq!(Extension::parse("DSN"), Extension::Dsn);
        assert_eq!(Extension::parse("vrfy"), Extension::Vrfy);
    }

    #[test]
    fn parse_unknown() {
        assert_eq!(
            Extension::parse("smtp.example.com at your service"),
            Extension::Unknown("smtp.example.com at your service".into())
        );
        assert!(matches!(Extension::parse(""), Extension::Unknown(_)));
    }

    #[test]
    fn advertises_matches_first_token() {
        assert!(Extension::advertises("VRFY", "VRFY"));
        assert!(Extension::advertises("auth PLAIN", "AUTH"));
        assert!(!Extension::advertises("X-VRFY", "VRFY"));
        assert!(!Extension::advertises("", "VRFY"));
    }
}
