//! # mailwire-pop3
//!
//! A POP3 client session implementing RFC 1939.
//!
//! ## Features
//!
//! - **Enforced session states**: every command is checked against the
//!   state it is legal in before anything reaches the wire
//! - **TLS support**: implicit TLS (port 995) and in-place STLS upgrade
//! - **Authentication**: USER/PASS and AUTH LOGIN
//! - **Extensions**: CAPA, TOP and UIDL, gated on what the server advertises
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwire_pop3::{AuthMechanism, Config, MailboxSession, Security};
//!
//! #[tokio::main]
//! async fn main() -> mailwire_pop3::Result<()> {
//!     let config = Config::new("pop.example.com", 995, Security::Implicit)?;
//!     let mut session = MailboxSession::new(config);
//!
//!     session.connect().await?;
//!     session
//!         .authenticate("bob@example.com", "password", AuthMechanism::Plain)
//!         .await?;
//!
//!     let status = session.status().await?;
//!     for (message, _size) in session.list().await? {
//!         let text = session.retrieve(message).await?;
//!         println!("{}", text.lines().next().unwrap_or_default());
//!     }
//!     println!("{} messages", status.messages);
//!
//!     session.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: POP3 command builders
//! - [`response`]: Status-indicator and listing parsers

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
mod error;
pub mod response;
mod session;
mod state;

pub use error::{Error, Result};
pub use response::MaildropStatus;
pub use session::MailboxSession;
pub use state::{SessionState, StateSet};

pub use mailwire_net::{AuthMechanism, Config, ConfigBuilder, Protocol, Security};
