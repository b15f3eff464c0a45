//! # mailwire-smtp
//!
//! An SMTP submission client implementing RFC 5321.
//!
//! ## Features
//!
//! - **Enforced session states**: mail transactions are refused until the
//!   session has authenticated
//! - **TLS support**: implicit TLS (port 465) and STARTTLS (port 587)
//! - **Authentication**: AUTH PLAIN and AUTH LOGIN
//! - **Message rendering**: RFC 5322 headers, encoded words and dot-stuffing
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwire_smtp::{AuthMechanism, Config, Mailbox, Message, Security, SubmissionSession};
//!
//! #[tokio::main]
//! async fn main() -> mailwire_smtp::Result<()> {
//!     let config = Config::new("smtp.example.com", 587, Security::StartTls)?;
//!     let mut session = SubmissionSession::new(config);
//!
//!     session.connect().await?;
//!     session.ehlo(None).await?;
//!     session
//!         .authenticate("alice@example.com", "password", AuthMechanism::Plain)
//!         .await?;
//!
//!     let message = Message::new()
//!         .from(Mailbox::with_name("Alice", "alice@example.com")?)
//!         .to(Mailbox::new("bob@example.org")?)
//!         .subject("Hello")
//!         .body("Hi Bob!");
//!
//!     // Closes the connection once the server has queued the message.
//!     session.send(&message).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders and DATA dot-stuffing
//! - [`parser`]: Reply parsing
//! - [`types`]: Addresses, replies and extensions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
mod error;
mod message;
pub mod parser;
mod session;
mod state;
pub mod types;

pub use error::{Error, Result};
pub use message::{Message, Priority};
pub use session::SubmissionSession;
pub use state::{SessionState, StateSet};
pub use types::{Address, Extension, Mailbox, Reply, ReplyCode};

pub use mailwire_net::{AuthMechanism, Config, ConfigBuilder, Protocol, Security};
