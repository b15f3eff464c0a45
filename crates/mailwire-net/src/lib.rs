//! # mailwire-net
//!
//! The connection layer shared by the mailwire POP3 and SMTP clients.
//!
//! A [`Connection`] owns one byte stream to a mail server and frames it as
//! CRLF-terminated lines. Protocol sessions hold a connection and add their
//! own command/response semantics on top.
//!
//! ## Features
//!
//! - **Security modes**: plaintext, implicit TLS, and in-place upgrade after
//!   the greeting (STARTTLS / STLS)
//! - **TLS via rustls**: behind the default `tls` feature
//! - **Fail-fast I/O**: a read or write failure drops the transport
//! - **Injected logging**: every event is parented on a caller-supplied
//!   `tracing` span
//!
//! ## Example
//!
//! ```ignore
//! use mailwire_net::{Config, Connection, Security};
//!
//! let config = Config::new("pop.example.com", 995, Security::Implicit)?;
//! let mut conn = Connection::new(config);
//! let greeting = conn.connect(|line| line.starts_with("+OK")).await?;
//! conn.write_line("NOOP").await?;
//! let reply = conn.read_line(true).await?;
//! conn.close();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod connection;
mod error;
mod mechanism;
pub mod stream;

pub use config::{
    Config, ConfigBuilder, DEFAULT_CLIENT_DOMAIN, DEFAULT_CONNECT_TIMEOUT, Protocol, Security,
};
pub use connection::{CRLF, Connection};
pub use error::{Error, Result};
pub use mechanism::AuthMechanism;
pub use stream::{Io, MailStream};

#[cfg(feature = "tls")]
pub use rustls;
