//! SMTP connection management with type-state pattern.

mod client;
mod guard;
mod stream;

pub use client::{
    Aborted, Authenticated, Client, Connected, Data, Failed, MailTransaction, Ready,
    RecipientAdded, SmtpConnection, Step,
};
pub use guard::IoGuard;
pub use stream::{
    Connector, MAX_LINE_LENGTH, MAX_REPLY_LINES, MailStream, SmtpStream, TcpConnector,
};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Extensions advertised in an EHLO reply.
///
/// Valid for a single session only; servers may change what they offer
/// between connections and after STARTTLS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionSet(HashSet<Extension>);

impl ExtensionSet {
    /// Builds the set from the EHLO reply lines following the greeting line.
    pub fn from_ehlo_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self(lines.into_iter().map(Extension::parse).collect())
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.0.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if AUTH is advertised, with any mechanism list.
    #[must_use]
    pub fn supports_auth(&self) -> bool {
        self.0.iter().any(|ext| matches!(ext, Extension::Auth(_)))
    }

    /// Returns the recognised authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.0
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.0.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns the number of advertised extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing was advertised (e.g. after a HELO fallback).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Server information collected during the session.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Extensions from the most recent EHLO.
    pub extensions: ExtensionSet,
}
