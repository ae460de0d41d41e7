//! Error types for sending notification mail.

use std::fmt;

use thiserror::Error;

/// Sub-step of the DATA phase that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataStage {
    /// The `DATA` command was not answered with `354`.
    Open,
    /// Writing the message content failed.
    Write,
    /// The `.` terminator failed or the server rejected the message.
    Terminate,
}

impl fmt::Display for DataStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Write => "write",
            Self::Terminate => "terminate",
        })
    }
}

/// Phase in which a send failed, without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No usable sender, or an invalid configuration.
    Configuration,
    /// The message cannot be rendered safely.
    InvalidMessage,
    /// The TCP connection could not be established.
    Dial,
    /// The greeting or EHLO/HELO exchange failed.
    Greeting,
    /// STARTTLS or the TLS handshake failed.
    TlsUpgrade,
    /// AUTH was refused.
    Auth,
    /// The sender address was rejected.
    MailFrom,
    /// The recipient address was rejected.
    RcptTo,
    /// The DATA phase failed.
    Data(DataStage),
    /// QUIT or closing the transport failed after a delivered message.
    Close,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => f.write_str("configuration"),
            Self::InvalidMessage => f.write_str("invalid_message"),
            Self::Dial => f.write_str("dial"),
            Self::Greeting => f.write_str("greeting"),
            Self::TlsUpgrade => f.write_str("tls_upgrade"),
            Self::Auth => f.write_str("auth"),
            Self::MailFrom => f.write_str("mail_from"),
            Self::RcptTo => f.write_str("rcpt_to"),
            Self::Data(stage) => write!(f, "data_{stage}"),
            Self::Close => f.write_str("close"),
        }
    }
}

/// Errors returned by [`Mailer::send`](crate::Mailer::send).
///
/// Every variant past the configuration checks wraps the protocol error that
/// caused it, so the server's reply code stays reachable through
/// [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum SendError {
    /// The sender is not configured or the configuration is unusable.
    #[error("email sender not configured: {0}")]
    Configuration(String),

    /// The message would produce a malformed or injected header.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Connecting to the server failed.
    #[error("smtp dial failed to {addr}: {source}")]
    Dial {
        /// `host:port` that was dialed.
        addr: String,
        /// Underlying error.
        #[source]
        source: courier_smtp::Error,
    },

    /// The server greeting or EHLO exchange failed.
    #[error("smtp greeting failed: {0}")]
    Greeting(#[source] courier_smtp::Error),

    /// STARTTLS was advertised but the upgrade failed.
    #[error("smtp STARTTLS failed: {0}")]
    TlsUpgrade(#[source] courier_smtp::Error),

    /// Authentication failed.
    #[error("smtp AUTH failed: {0}")]
    Auth(#[source] courier_smtp::Error),

    /// The sender was rejected.
    #[error("smtp MAIL FROM failed for {address}: {source}")]
    MailFrom {
        /// Rejected sender address.
        address: String,
        /// Underlying error.
        #[source]
        source: courier_smtp::Error,
    },

    /// The recipient was rejected.
    #[error("smtp RCPT TO failed for {address}: {source}")]
    RcptTo {
        /// Rejected recipient address.
        address: String,
        /// Underlying error.
        #[source]
        source: courier_smtp::Error,
    },

    /// The DATA phase failed.
    #[error("smtp DATA {stage} failed: {source}")]
    Data {
        /// Which part of the DATA phase failed.
        stage: DataStage,
        /// Underlying error.
        #[source]
        source: courier_smtp::Error,
    },

    /// QUIT failed after the message was accepted.
    #[error("smtp QUIT failed: {0}")]
    Close(#[source] courier_smtp::Error),
}

impl SendError {
    /// Returns the phase this error belongs to.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::InvalidMessage(_) => ErrorKind::InvalidMessage,
            Self::Dial { .. } => ErrorKind::Dial,
            Self::Greeting(_) => ErrorKind::Greeting,
            Self::TlsUpgrade(_) => ErrorKind::TlsUpgrade,
            Self::Auth(_) => ErrorKind::Auth,
            Self::MailFrom { .. } => ErrorKind::MailFrom,
            Self::RcptTo { .. } => ErrorKind::RcptTo,
            Self::Data { stage, .. } => ErrorKind::Data(*stage),
            Self::Close(_) => ErrorKind::Close,
        }
    }

    /// Returns the address an envelope error refers to.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::MailFrom { address, .. } | Self::RcptTo { address, .. } => Some(address),
            _ => None,
        }
    }

    /// Returns the underlying protocol error, if any.
    #[must_use]
    pub const fn protocol_error(&self) -> Option<&courier_smtp::Error> {
        match self {
            Self::Configuration(_) | Self::InvalidMessage(_) => None,
            Self::Dial { source, .. }
            | Self::MailFrom { source, .. }
            | Self::RcptTo { source, .. }
            | Self::Data { source, .. }
            | Self::Greeting(source)
            | Self::TlsUpgrade(source)
            | Self::Auth(source)
            | Self::Close(source) => Some(source),
        }
    }

    /// Returns the SMTP reply code behind this error, if the server sent one.
    #[must_use]
    pub fn reply_code(&self) -> Option<u16> {
        self.protocol_error().and_then(courier_smtp::Error::reply_code)
    }

    /// Returns true if trying again later may succeed (4xx replies,
    /// timeouts and dropped connections).
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.protocol_error()
            .is_some_and(courier_smtp::Error::is_transient)
    }

    /// Returns true if the failure came from the caller's cancellation token.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.protocol_error(), Some(courier_smtp::Error::Cancelled(_)))
    }

    /// Returns true if a deadline or per-operation timeout expired.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.protocol_error(), Some(courier_smtp::Error::Timeout(_)))
    }
}

/// Result type alias using [`SendError`].
pub type Result<T> = std::result::Result<T, SendError>;
