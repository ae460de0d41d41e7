//! Type-state SMTP client.

use std::marker::PhantomData;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use super::{Connector, ExtensionSet, ServerInfo, SmtpStream};
use crate::command::Command;
use crate::data;
use crate::error::{Error, Result};
use crate::parser::parse_reply;
use crate::types::{Address, AuthMechanism, Reply, ReplyCode};

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

/// Type-state marker for mail transaction started.
#[derive(Debug)]
pub struct MailTransaction;

/// Type-state marker for recipient added.
#[derive(Debug)]
pub struct RecipientAdded;

/// Type-state marker for data mode.
#[derive(Debug)]
pub struct Data;

/// Type-state marker for a session that hit an error; only `quit` remains.
#[derive(Debug)]
pub struct Failed;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Connected {}
    impl Sealed for super::Authenticated {}
}

/// States from which a mail transaction may be started.
pub trait Ready: sealed::Sealed {}
impl Ready for Connected {}
impl Ready for Authenticated {}

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<S, State> {
    stream: SmtpStream<S>,
    server_info: ServerInfo,
    encrypted: bool,
    _state: PhantomData<State>,
}

/// Outcome of a state transition.
pub type Step<S, Next> = std::result::Result<Client<S, Next>, Aborted<S>>;

/// A failed transition.
///
/// Carries the error and, when the transport is still usable, the client in
/// the [`Failed`] state so the caller can still say goodbye with `QUIT`.
#[derive(Debug)]
pub struct Aborted<S, E = Error> {
    /// What went wrong.
    pub error: E,
    /// The client, unless the transport was consumed (failed TLS handshake).
    pub client: Option<Client<S, Failed>>,
}

impl<S, E> Aborted<S, E> {
    /// Maps the error, keeping the client.
    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Aborted<S, F> {
        Aborted {
            error: f(self.error),
            client: self.client,
        }
    }

    /// Splits into the error and the failed client.
    pub fn into_parts(self) -> (E, Option<Client<S, Failed>>) {
        (self.error, self.client)
    }
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;

    /// Returns true once STARTTLS completed.
    fn is_encrypted(&self) -> bool;
}

impl<S, State> SmtpConnection for Client<S, State> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S, Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] if reading the greeting fails or the server does
    /// not answer `220`.
    pub async fn from_stream(stream: SmtpStream<S>) -> Step<S, Connected> {
        let mut client = Self {
            stream,
            server_info: ServerInfo::default(),
            encrypted: false,
            _state: PhantomData,
        };

        match client.read_reply().await {
            Ok(greeting) if greeting.code == ReplyCode::SERVICE_READY => {
                // Extract hostname from greeting (first word after code)
                client.server_info.hostname = greeting
                    .message
                    .first()
                    .and_then(|msg| msg.split_whitespace().next())
                    .unwrap_or("unknown")
                    .to_string();
                Ok(client)
            }
            Ok(greeting) => Err(client.abort(greeting.into_error())),
            Err(e) => Err(client.abort(e)),
        }
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// Falls back to HELO (with no extensions) when the server rejects EHLO
    /// with a permanent error.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] if both greetings fail.
    pub async fn ehlo(mut self, client_hostname: &str) -> Step<S, Connected> {
        let outcome = self.negotiate(client_hostname).await;
        self.advance(outcome)
    }

    /// Upgrades the connection to TLS using STARTTLS and repeats EHLO.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] if STARTTLS is not advertised, the server refuses
    /// it, the handshake fails or the post-handshake EHLO fails. A failed
    /// handshake consumes the transport, so no client is returned then.
    pub async fn starttls<C>(
        mut self,
        connector: &C,
        host: &str,
        client_hostname: &str,
    ) -> Step<S, Connected>
    where
        C: Connector<Stream = S>,
    {
        if self.encrypted {
            return Err(self.abort(Error::InvalidState("Connection is already encrypted".into())));
        }
        if !self.server_info.extensions.supports_starttls() {
            return Err(self.abort(Error::NotSupported("STARTTLS".into())));
        }

        let ready = self
            .command(Command::StartTls, |code| code == ReplyCode::SERVICE_READY)
            .await;
        if let Err(e) = ready {
            return Err(self.abort(e));
        }

        // Bytes received before the handshake did not come through TLS.
        if self.stream.has_buffered_data() {
            return Err(self.abort(Error::Protocol(
                "Server sent data before the TLS handshake".into(),
            )));
        }

        let Self {
            stream,
            server_info,
            ..
        } = self;
        let (transport, guard) = stream.into_parts();
        let transport = match guard
            .run("negotiating TLS", connector.upgrade(transport, host))
            .await
        {
            Ok(transport) => transport,
            Err(error) => {
                return Err(Aborted {
                    error,
                    client: None,
                });
            }
        };
        debug!(host, "TLS established");

        let mut client = Self {
            stream: SmtpStream::new(transport, guard),
            server_info: ServerInfo {
                hostname: server_info.hostname,
                extensions: ExtensionSet::default(),
            },
            encrypted: true,
            _state: PhantomData,
        };
        let outcome = client.negotiate(client_hostname).await;
        client.advance(outcome)
    }

    /// Authenticates using PLAIN mechanism.
    ///
    /// The credentials go out as an initial response; if the server asks for
    /// them again with an empty `334` challenge they are resent once.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] if authentication fails.
    pub async fn auth_plain(mut self, username: &str, password: &str) -> Step<S, Authenticated> {
        let outcome = self.authenticate_plain(username, password).await;
        self.advance(outcome)
    }

    async fn negotiate(&mut self, client_hostname: &str) -> Result<()> {
        let reply = self
            .send_command(&Command::Ehlo {
                hostname: client_hostname.to_string(),
            })
            .await?;

        if reply.is_success() {
            // Skip first line which is greeting
            self.server_info.extensions =
                ExtensionSet::from_ehlo_lines(reply.message.iter().skip(1).map(String::as_str));
            debug!(
                extensions = self.server_info.extensions.len(),
                "EHLO accepted"
            );
            return Ok(());
        }
        if !reply.code.is_permanent() {
            return Err(reply.into_error());
        }

        debug!(code = %reply.code, "EHLO rejected, falling back to HELO");
        self.command(
            Command::Helo {
                hostname: client_hostname.to_string(),
            },
            ReplyCode::is_success,
        )
        .await?;
        self.server_info.extensions = ExtensionSet::default();
        Ok(())
    }

    async fn authenticate_plain(&mut self, username: &str, password: &str) -> Result<()> {
        let response = plain_response(username, password);
        let mut reply = self
            .send_command(&Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some(response.clone()),
            })
            .await?;

        if reply.code == ReplyCode::AUTH_CONTINUE {
            reply = self.send_command(&Command::AuthResponse(response)).await?;
        }

        if reply.is_success() {
            Ok(())
        } else {
            Err(reply.into_error())
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin, State: Ready> Client<S, State> {
    /// Starts a mail transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] if the MAIL FROM command fails.
    pub async fn mail_from(mut self, from: &Address) -> Step<S, MailTransaction> {
        let outcome = self
            .command(Command::MailFrom { from: from.clone() }, ReplyCode::is_success)
            .await;
        self.advance(outcome)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S, MailTransaction> {
    /// Adds the recipient to the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] if the RCPT TO command fails.
    pub async fn rcpt_to(mut self, to: &Address) -> Step<S, RecipientAdded> {
        let outcome = self
            .command(Command::RcptTo { to: to.clone() }, ReplyCode::is_success)
            .await;
        self.advance(outcome)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S, RecipientAdded> {
    /// Begins sending message data.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] unless the server answers `354`.
    pub async fn data(mut self) -> Step<S, Data> {
        let outcome = self
            .command(Command::Data, |code| code == ReplyCode::START_DATA)
            .await;
        self.advance(outcome)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S, Data> {
    /// Writes the message content.
    ///
    /// Message should be RFC 5322 formatted. Line endings are normalized to
    /// CRLF and leading dots are stuffed. Call [`Client::finish`] afterwards,
    /// even if this fails.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn write_body(&mut self, message: &[u8]) -> Result<()> {
        self.stream.write_all(&data::encode(message)).await
    }

    /// Sends the end-of-data marker and reads the server's verdict.
    ///
    /// # Errors
    ///
    /// Returns [`Aborted`] if writing the marker fails or the server rejects
    /// the message.
    pub async fn finish(mut self) -> Step<S, Connected> {
        let outcome = self.end_data().await;
        self.advance(outcome)
    }

    async fn end_data(&mut self) -> Result<()> {
        self.stream.write_all(data::TERMINATOR).await?;
        let reply = self.read_reply().await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(reply.into_error())
        }
    }
}

// Common implementation for all states
impl<S: AsyncRead + AsyncWrite + Unpin, State> Client<S, State> {
    /// Gives up on the session, keeping only the ability to `QUIT`.
    #[must_use]
    pub fn abandon(self) -> Client<S, Failed> {
        self.transition()
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// The transport is shut down and dropped whether or not QUIT succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT exchange fails.
    pub async fn quit(mut self) -> Result<()> {
        let outcome = self
            .command(Command::Quit, ReplyCode::is_success)
            .await
            .map(drop);

        if let Err(e) = self.stream.shutdown().await {
            trace!(error = %e, "shutdown after QUIT failed");
        }
        outcome
    }

    fn transition<Next>(self) -> Client<S, Next> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            encrypted: self.encrypted,
            _state: PhantomData,
        }
    }

    fn abort(self, error: Error) -> Aborted<S> {
        Aborted {
            error,
            client: Some(self.transition()),
        }
    }

    fn advance<Next, T>(self, outcome: Result<T>) -> Step<S, Next> {
        match outcome {
            Ok(_) => Ok(self.transition()),
            Err(error) => Err(self.abort(error)),
        }
    }

    async fn command(&mut self, cmd: Command, accept: impl Fn(ReplyCode) -> bool) -> Result<Reply> {
        let reply = self.send_command(&cmd).await?;
        if accept(reply.code) {
            Ok(reply)
        } else {
            Err(reply.into_error())
        }
    }

    async fn send_command(&mut self, cmd: &Command) -> Result<Reply> {
        debug!(command = cmd.verb(), "sending command");
        self.stream.write_all(&cmd.serialize()).await?;
        self.read_reply().await
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let lines = self.stream.read_reply_lines().await?;
        let reply = parse_reply(&lines)?;
        debug!(code = %reply.code, "received reply");
        Ok(reply)
    }
}

/// Builds the SASL PLAIN initial response (RFC 4616): `\0user\0password`.
fn plain_response(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}
