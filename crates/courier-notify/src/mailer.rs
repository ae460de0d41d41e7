//! One-shot SMTP sessions.
//!
//! Each call to [`Mailer::send`] dials the relay, greets it, upgrades to TLS
//! when offered, authenticates when both sides allow it, hands over exactly
//! one message and says goodbye. Nothing is retried or reused.

use std::sync::Arc;

use courier_smtp::connection::{Aborted, Client, Connected, Ready, SmtpConnection, SmtpStream};
use courier_smtp::{Address, AuthMechanism, Connector, TcpConnector};
use secrecy::ExposeSecret;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::SessionConfig;
use crate::context::SendContext;
use crate::error::{DataStage, Result, SendError};
use crate::message::Message;

/// A failed phase, with the client if `QUIT` is still possible.
type Abort<S> = Aborted<S, SendError>;

/// Sends messages through one configured relay.
///
/// Cheap to clone; clones share the configuration and the connector.
#[derive(Debug)]
pub struct Mailer<C = TcpConnector> {
    config: Arc<SessionConfig>,
    connector: Arc<C>,
}

impl<C> Clone for Mailer<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            connector: Arc::clone(&self.connector),
        }
    }
}

impl Mailer<TcpConnector> {
    /// Creates a mailer using TCP and the webpki trust roots.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, TcpConnector::new())
    }
}

impl<C: Connector> Mailer<C> {
    /// Creates a mailer with a custom transport.
    #[must_use]
    pub fn with_connector(config: SessionConfig, connector: C) -> Self {
        Self {
            config: Arc::new(config),
            connector: Arc::new(connector),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Sends a message in a fresh SMTP session.
    ///
    /// The sender is the message's override, else the configured `from`,
    /// else the username.
    ///
    /// # Errors
    ///
    /// Returns a [`SendError`] naming the phase that failed. Configuration
    /// and message errors are reported before any connection is made.
    pub async fn send(&self, ctx: &SendContext, message: &Message) -> Result<()> {
        self.config.validate()?;
        let sender = message
            .sender_override()
            .or_else(|| self.config.default_sender())
            .ok_or_else(|| SendError::Configuration("From/Username is empty".into()))?;
        message.validate()?;

        let from = Address::new(sender).map_err(|source| SendError::MailFrom {
            address: sender.to_string(),
            source,
        })?;
        let to = Address::new(&message.to).map_err(|source| SendError::RcptTo {
            address: message.to.clone(),
            source,
        })?;
        let payload = message.render(from.as_str());

        let span = info_span!(
            "smtp_session",
            server = %self.config.address(),
            to = %to,
        );
        let outcome = self
            .session(ctx, &from, &to, payload.as_bytes())
            .instrument(span)
            .await;

        match &outcome {
            Ok(()) => info!(server = %self.config.address(), to = %to, "message delivered"),
            Err(e) => warn!(
                server = %self.config.address(),
                to = %to,
                kind = %e.kind(),
                error = %e,
                "message delivery failed"
            ),
        }
        outcome
    }

    async fn session(
        &self,
        ctx: &SendContext,
        from: &Address,
        to: &Address,
        payload: &[u8],
    ) -> Result<()> {
        let stream = self.dial(ctx).await?;

        let outcome = match Client::from_stream(stream).await {
            Ok(client) => self.transact(client, from, to, payload).await,
            Err(aborted) => Err(aborted.map_err(SendError::Greeting)),
        };

        match outcome {
            Ok(client) => client.quit().await.map_err(SendError::Close),
            Err(aborted) => {
                let (error, client) = aborted.into_parts();
                if let Some(client) = client
                    && let Err(e) = client.quit().await
                {
                    debug!(error = %e, "QUIT after failure did not complete");
                }
                Err(error)
            }
        }
    }

    async fn dial(&self, ctx: &SendContext) -> Result<SmtpStream<C::Stream>> {
        let addr = self.config.address();
        let host = self.config.host.trim();

        let transport = ctx
            .guard(self.config.connect_timeout)
            .run("connecting", async {
                self.connector
                    .connect(host, self.config.port)
                    .await
                    .map_err(courier_smtp::Error::from)
            })
            .await
            .map_err(|source| SendError::Dial {
                addr: addr.clone(),
                source,
            })?;

        debug!(%addr, "connected");
        Ok(SmtpStream::new(
            transport,
            ctx.guard(self.config.command_timeout),
        ))
    }

    async fn transact(
        &self,
        client: Client<C::Stream, Connected>,
        from: &Address,
        to: &Address,
        payload: &[u8],
    ) -> std::result::Result<Client<C::Stream, Connected>, Abort<C::Stream>> {
        let client = client
            .ehlo(&self.config.client_name)
            .await
            .map_err(|a| a.map_err(SendError::Greeting))?;

        let client = if client.server_info().extensions.supports_starttls() {
            client
                .starttls(
                    self.connector.as_ref(),
                    self.config.host.trim(),
                    &self.config.client_name,
                )
                .await
                .map_err(|a| a.map_err(SendError::TlsUpgrade))?
        } else {
            debug!("STARTTLS not offered, continuing in plaintext");
            client
        };

        let offers_auth = client.server_info().extensions.supports_auth();
        if offers_auth && self.config.has_credentials() {
            let client = self.authenticate(client).await?;
            self.deliver(client, from, to, payload).await
        } else {
            if offers_auth {
                debug!("no credentials configured, skipping AUTH");
            } else if self.config.has_credentials() {
                debug!("server does not offer AUTH, sending unauthenticated");
            }
            self.deliver(client, from, to, payload).await
        }
    }

    async fn authenticate(
        &self,
        client: Client<C::Stream, Connected>,
    ) -> std::result::Result<Client<C::Stream, courier_smtp::Authenticated>, Abort<C::Stream>>
    {
        if !client.is_encrypted() && !self.config.is_loopback() {
            return Err(Aborted {
                error: SendError::Auth(courier_smtp::Error::InvalidState(
                    "refusing to send credentials over an unencrypted connection".into(),
                )),
                client: Some(client.abandon()),
            });
        }

        let mechanisms = client.server_info().extensions.auth_mechanisms();
        if !mechanisms.is_empty() && !mechanisms.contains(&AuthMechanism::Plain) {
            warn!(
                ?mechanisms,
                "server does not list PLAIN among its AUTH mechanisms, trying anyway"
            );
        }

        client
            .auth_plain(
                &self.config.username,
                self.config.password.expose_secret(),
            )
            .await
            .map_err(|a| a.map_err(SendError::Auth))
    }

    async fn deliver<State: Ready>(
        &self,
        client: Client<C::Stream, State>,
        from: &Address,
        to: &Address,
        payload: &[u8],
    ) -> std::result::Result<Client<C::Stream, Connected>, Abort<C::Stream>> {
        if let Some(limit) = client.server_info().extensions.max_message_size()
            && limit > 0
            && payload.len() > limit
        {
            warn!(
                size = payload.len(),
                limit, "message exceeds the advertised SIZE limit, sending anyway"
            );
        }

        let client = client.mail_from(from).await.map_err(|a| {
            a.map_err(|source| SendError::MailFrom {
                address: from.to_string(),
                source,
            })
        })?;

        let client = client.rcpt_to(to).await.map_err(|a| {
            a.map_err(|source| SendError::RcptTo {
                address: to.to_string(),
                source,
            })
        })?;

        let mut client = client
            .data()
            .await
            .map_err(|a| a.map_err(|source| data_error(DataStage::Open, source)))?;

        let written = client.write_body(payload).await;
        let finished = client.finish().await;

        match (written, finished) {
            (Ok(()), Ok(client)) => Ok(client),
            (Ok(()), Err(aborted)) => {
                Err(aborted.map_err(|source| data_error(DataStage::Terminate, source)))
            }
            (Err(source), Ok(client)) => Err(Aborted {
                error: data_error(DataStage::Write, source),
                client: Some(client.abandon()),
            }),
            (Err(source), Err(aborted)) => {
                let (terminate, client) = aborted.into_parts();
                debug!(error = %terminate, "terminator after failed write did not complete");
                Err(Aborted {
                    error: data_error(DataStage::Write, source),
                    client,
                })
            }
        }
    }
}

const fn data_error(stage: DataStage, source: courier_smtp::Error) -> SendError {
    SendError::Data { stage, source }
}
