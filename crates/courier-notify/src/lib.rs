//! # courier-notify
//!
//! Sends transactional notification mail (address verification, account
//! activation, password reset) through an SMTP relay.
//!
//! Every message gets its own session: dial, greet, upgrade to TLS when the
//! server offers STARTTLS, AUTH PLAIN when the server offers AUTH and
//! credentials are configured, one envelope, DATA, QUIT. Failures are
//! reported as a [`SendError`] naming the phase that failed; nothing is
//! retried.
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_notify::{Mailer, Message, SendContext, SessionConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::builder("smtp.example.com")
//!         .port(587)
//!         .credentials("noreply@example.com", "app-password")
//!         .build()?;
//!     let mailer = Mailer::new(config);
//!
//!     let ctx = SendContext::with_timeout(Duration::from_secs(30));
//!     mailer
//!         .send(&ctx, &Message::new("bob@example.com", "Hello", "Hi Bob"))
//!         .await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
mod context;
mod error;
mod mailer;
mod message;
pub mod notify;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use context::SendContext;
pub use error::{DataStage, ErrorKind, Result, SendError};
pub use mailer::Mailer;
pub use message::Message;
pub use notify::{EmailSender, Notification, Notifier};

pub use tokio_util::sync::CancellationToken;
