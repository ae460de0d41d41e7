//! # courier-smtp
//!
//! A small SMTP client wire layer implementing the parts of RFC 5321 needed
//! to hand one message to a relay.
//!
//! ## Features
//!
//! - **Type-state connection management**: Compile-time enforcement of valid
//!   SMTP state transitions, with a `Failed` state that only permits `QUIT`
//! - **Protocol support**: EHLO (with HELO fallback), STARTTLS, AUTH PLAIN,
//!   MAIL FROM, RCPT TO, DATA, QUIT
//! - **Deadlines**: every read, write and handshake is bounded by an
//!   [`IoGuard`](connection::IoGuard) carrying a deadline, a per-operation
//!   timeout and a cancellation token
//! - **Pluggable transports**: the [`Connector`](connection::Connector) trait
//!   opens and upgrades connections; [`TcpConnector`](connection::TcpConnector)
//!   uses tokio and rustls
//!
//! ## Quick Start
//!
//! ```ignore
//! use courier_smtp::Address;
//! use courier_smtp::connection::{Client, Connector, IoGuard, SmtpStream, TcpConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connector = TcpConnector::new();
//!     let transport = connector.connect("smtp.example.com", 587).await?;
//!     let stream = SmtpStream::new(transport, IoGuard::new());
//!
//!     let client = Client::from_stream(stream).await.map_err(|a| a.error)?;
//!     let client = client.ehlo("client.example.com").await.map_err(|a| a.error)?;
//!     let client = client
//!         .starttls(&connector, "smtp.example.com", "client.example.com")
//!         .await
//!         .map_err(|a| a.error)?;
//!     let client = client.auth_plain("user@example.com", "password").await.map_err(|a| a.error)?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let to = Address::new("recipient@example.com")?;
//!     let client = client.mail_from(&from).await.map_err(|a| a.error)?;
//!     let client = client.rcpt_to(&to).await.map_err(|a| a.error)?;
//!     let mut client = client.data().await.map_err(|a| a.error)?;
//!     client.write_body(b"Subject: Test\r\n\r\nHello, World!\r\n").await?;
//!     let client = client.finish().await.map_err(|a| a.error)?;
//!
//!     client.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── auth_plain() ───→ Authenticated
//! └──────────────┘                            │
//!        │                                    │
//!        └─── mail_from() ───→ MailTransaction ───→ RecipientAdded ───→ Data
//!
//! any failed transition ───→ Failed ─── quit()
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Connection management and type-state client
//! - [`data`]: DATA body encoding
//! - [`parser`]: Response parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
pub mod data;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    Aborted, Authenticated, Client, Connected, Connector, Data, ExtensionSet, Failed, IoGuard,
    MailStream, MailTransaction, RecipientAdded, ServerInfo, SmtpConnection, SmtpStream,
    TcpConnector,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
