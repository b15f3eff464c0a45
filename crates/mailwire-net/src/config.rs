//! Connection configuration types.

use std::time::Duration;

#[cfg(feature = "tls")]
use std::sync::Arc;

use crate::{Error, Result};

/// Default timeout for opening the transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Domain announced by `EHLO`/`HELO` when none is configured.
pub const DEFAULT_CLIENT_DOMAIN: &str = "localhost";

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption. **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade in place after the greeting.
    StartTls,
    /// TLS from the start. **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns true if this mode needs TLS support at some point.
    #[must_use]
    pub const fn requires_tls(self) -> bool {
        matches!(self, Self::StartTls | Self::Implicit)
    }

    /// Returns the well-known port for this security mode.
    #[must_use]
    pub const fn default_port(self, protocol: Protocol) -> u16 {
        match (protocol, self) {
            (Protocol::Pop3, Self::None | Self::StartTls) => 110,
            (Protocol::Pop3, Self::Implicit) => 995,
            (Protocol::Submission, Self::None | Self::StartTls) => 587,
            (Protocol::Submission, Self::Implicit) => 465,
        }
    }
}

/// Mail protocol spoken over a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Maildrop retrieval (RFC 1939).
    Pop3,
    /// Message submission (RFC 6409 / RFC 5321).
    Submission,
}

impl Protocol {
    /// Short lowercase name, used in log spans.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pop3 => "pop3",
            Self::Submission => "smtp",
        }
    }
}

/// Connection parameters. Immutable once a session holds them.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Bound on opening the transport.
    pub connect_timeout: Duration,
    /// Domain the client identifies itself with.
    pub client_domain: String,
    /// TLS settings; `None` uses the webpki root store.
    #[cfg(feature = "tls")]
    pub tls: Option<Arc<rustls::ClientConfig>>,
}

impl Config {
    /// Creates a configuration with the default timeout and client domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is empty or the port is zero.
    pub fn new(host: impl Into<String>, port: u16, security: Security) -> Result<Self> {
        ConfigBuilder::new(host).port(port).security(security).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder for connection configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    client_domain: String,
    #[cfg(feature = "tls")]
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            client_domain: DEFAULT_CLIENT_DOMAIN.to_string(),
            #[cfg(feature = "tls")]
            tls: None,
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the port to the well-known one for `protocol` and the current
    /// security mode. Call after [`security`](Self::security).
    #[must_use]
    pub const fn default_port(mut self, protocol: Protocol) -> Self {
        self.port = Some(self.security.default_port(protocol));
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the domain used by `EHLO`/`HELO`.
    #[must_use]
    pub fn client_domain(mut self, domain: impl Into<String>) -> Self {
        self.client_domain = domain.into();
        self
    }

    /// Uses a caller-provided rustls configuration (custom roots, client
    /// certificates).
    #[cfg(feature = "tls")]
    #[must_use]
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is empty, the port is unset or
    /// zero, or the timeout is zero.
    pub fn build(self) -> Result<Config> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("The hostname is not defined".into()));
        }
        let port = match self.port {
            None | Some(0) => return Err(Error::Config("The port is not defined".into())),
            Some(port) => port,
        };
        if self.connect_timeout.is_zero() {
            return Err(Error::Config("The timeout is not defined".into()));
        }

        Ok(Config {
            host: self.host,
            port,
            security: self.security,
            connect_timeout: self.connect_timeout,
            client_domain: self.client_domain,
            #[cfg(feature = "tls")]
            tls: self.tls,
        })
    }
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

    #[test]
    fn test_default_ports() {
        assert_eq!(Security::None.default_port(Protocol::Pop3), 110);
        assert_eq!(Security::StartTls.default_port(Protocol::Pop3), 110);
        assert_eq!(Security::Implicit.default_port(Protocol::Pop3), 995);
        assert_eq!(Security::StartTls.default_port(Protocol::Submission), 587);
        assert_eq!(Security::Implicit.default_port(Protocol::Submission), 465);
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(Protocol::Pop3.as_str(), "pop3");
        assert_eq!(Protocol::Submission.as_str(), "smtp");
    }

    #[test]
    fn test_config_new() {
        let config = Config::new("pop.example.com", 995, Security::Implicit).unwrap();
        assert_eq!(config.host, "pop.example.com");
        assert_eq!(config.port, 995);
        assert_eq!(config.security, Security::Implicit);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.client_domain, "localhost");
        assert_eq!(config.address(), "pop.example.com:995");
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("smtp.example.com")
            .security(Security::StartTls)
            .default_port(Protocol::Submission)
            .connect_timeout(Duration::from_secs(10))
            .client_domain("client.example.org")
            .build()
            .unwrap();

        assert_eq!(config.port, 587);
        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.client_domain, "client.example.org");
    }

    #[test]
    fn test_missing_host() {
        let err = Config::new("  ", 110, Security::None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_port() {
        let err = Config::builder("pop.example.com").build().unwrap_err();
        assert!(err.to_string().contains("port"));

        let err = Config::new("pop.example.com", 0, Security::None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_timeout() {
        let err = Config::builder("pop.example.com")
            .port(110)
            .connect_timeout(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_requires_tls() {
        assert!(!Security::None.requires_tls());
        assert!(Security::StartTls.requires_tls());
        assert!(Security::Implicit.requires_tls());
    }
}
