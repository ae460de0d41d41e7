//! Plain-text notification messages.

use std::fmt::Write;

use crate::error::{Result, SendError};

/// A single-recipient plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender override; the configured sender is used when `None` or blank.
    pub from: Option<String>,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

impl Message {
    /// Creates a new message using the configured sender.
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from: None,
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Overrides the sender for this message.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.from = Some(sender.into());
        self
    }

    /// Returns the sender override, if set and not blank.
    #[must_use]
    pub fn sender_override(&self) -> Option<&str> {
        self.from.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Rejects values that would break out of their header line.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::InvalidMessage`] if the subject contains CR or LF.
    pub fn validate(&self) -> Result<()> {
        if self.subject.contains(['\r', '\n']) {
            return Err(SendError::InvalidMessage(
                "subject must not contain line breaks".into(),
            ));
        }
        Ok(())
    }

    /// Renders the message with the given envelope sender.
    ///
    /// Line endings in the body are left alone; the DATA encoder normalises
    /// them on the wire.
    #[must_use]
    pub fn render(&self, sender: &str) -> String {
        let mut message = String::with_capacity(self.body.len() + 160);

        let _ = write!(message, "From: {sender}\r\n");
        let _ = write!(message, "To: {}\r\n", self.to.trim());
        let _ = write!(message, "Subject: {}\r\n", self.subject);
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n");

        // Empty line between headers and body
        message.push_str("\r\n");

        message.push_str(&self.body);
        message.push_str("\r\n");

        message
    }
}
