//! Account notification emails built on top of an [`EmailSender`].
//!
//! Upstream flows (sign-up, activation, password reset) depend on the
//! [`EmailSender`] trait rather than on [`Mailer`] so they can be exercised
//! without a relay.

use std::fmt::Write;
use std::future::Future;
use std::time::Duration;

use courier_smtp::Connector;
use url::Url;

use crate::context::SendContext;
use crate::error::{Result, SendError};
use crate::mailer::Mailer;
use crate::message::Message;

/// Anything that can deliver a plain-text email.
pub trait EmailSender: Send + Sync {
    /// Sends `body` to `to` with the given subject.
    fn send_email(
        &self,
        ctx: &SendContext,
        to: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl<C: Connector> EmailSender for Mailer<C> {
    async fn send_email(&self, ctx: &SendContext, to: &str, subject: &str, body: &str) -> Result<()> {
        self.send(ctx, &Message::new(to, subject, body)).await
    }
}

/// An account notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Confirm ownership of an email address.
    Verification {
        /// Link that completes verification.
        link: String,
    },
    /// Activate a newly created account.
    Activation {
        /// Link that activates the account.
        link: String,
    },
    /// Reset a forgotten password.
    PasswordReset {
        /// Link to the reset form.
        link: String,
        /// How long the link stays valid.
        expires_in: Duration,
    },
}

impl Notification {
    /// Subject line.
    #[must_use]
    pub const fn subject(&self) -> &'static str {
        match self {
            Self::Verification { .. } => "Verify your email address",
            Self::Activation { .. } => "Activate your account",
            Self::PasswordReset { .. } => "Reset your password",
        }
    }

    /// The action link.
    #[must_use]
    pub fn link(&self) -> &str {
        match self {
            Self::Verification { link }
            | Self::Activation { link }
            | Self::PasswordReset { link, .. } => link,
        }
    }

    /// Plain-text body.
    #[must_use]
    pub fn body(&self) -> String {
        let mut body = String::new();
        match self {
            Self::Verification { link } => {
                let _ = writeln!(body, "Please confirm your email address by opening this link:");
                let _ = writeln!(body);
                let _ = writeln!(body, "{link}");
            }
            Self::Activation { link } => {
                let _ = writeln!(body, "Your account is ready. Activate it by opening this link:");
                let _ = writeln!(body);
                let _ = writeln!(body, "{link}");
            }
            Self::PasswordReset { link, expires_in } => {
                let _ = writeln!(body, "A password reset was requested for your account.");
                let _ = writeln!(body, "Open this link to choose a new password:");
                let _ = writeln!(body);
                let _ = writeln!(body, "{link}");
                let _ = writeln!(body);
                let _ = writeln!(
                    body,
                    "The link expires in {}. If you did not ask for this, ignore this email.",
                    describe(*expires_in)
                );
            }
        }
        body
    }
}

/// Builds account links from tokens and sends them.
#[derive(Debug, Clone)]
pub struct Notifier<E> {
    sender: E,
    base: Url,
}

impl<E: EmailSender> Notifier<E> {
    /// Creates a notifier whose links point below `frontend_base_url`.
    ///
    /// A path on the base URL is kept; links are resolved relative to it.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Configuration`] if the base URL does not parse
    /// or cannot carry a path.
    pub fn new(sender: E, frontend_base_url: &str) -> Result<Self> {
        let mut base = Url::parse(frontend_base_url.trim()).map_err(|e| {
            SendError::Configuration(format!("invalid frontend URL {frontend_base_url:?}: {e}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(SendError::Configuration(format!(
                "frontend URL {frontend_base_url:?} cannot carry a path"
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);
        base.set_fragment(None);

        Ok(Self { sender, base })
    }

    /// Returns the underlying sender.
    pub const fn sender(&self) -> &E {
        &self.sender
    }

    /// Resolves `path` against the frontend base URL and adds the token as
    /// the `token` query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Configuration`] if `path` does not form a valid
    /// URL.
    pub fn link(&self, path: &str, token: &str) -> Result<Url> {
        let mut url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|e| SendError::Configuration(format!("invalid link path {path:?}: {e}")))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }

    /// Sends an email-verification link.
    ///
    /// # Errors
    ///
    /// Returns the sender's error.
    pub async fn send_verification(&self, ctx: &SendContext, to: &str, token: &str) -> Result<()> {
        let link = self.link("verify-email", token)?.into();
        self.notify(ctx, to, &Notification::Verification { link }).await
    }

    /// Sends an account-activation link.
    ///
    /// # Errors
    ///
    /// Returns the sender's error.
    pub async fn send_activation(&self, ctx: &SendContext, to: &str, token: &str) -> Result<()> {
        let link = self.link("activate", token)?.into();
        self.notify(ctx, to, &Notification::Activation { link }).await
    }

    /// Sends a password-reset link valid for `expires_in`.
    ///
    /// # Errors
    ///
    /// Returns the sender's error.
    pub async fn send_password_reset(
        &self,
        ctx: &SendContext,
        to: &str,
        token: &str,
        expires_in: Duration,
    ) -> Result<()> {
        let link = self.link("reset-password", token)?.into();
        self.notify(ctx, to, &Notification::PasswordReset { link, expires_in })
            .await
    }

    /// Sends any notification.
    ///
    /// # Errors
    ///
    /// Returns the sender's error.
    pub async fn notify(&self, ctx: &SendContext, to: &str, notification: &Notification) -> Result<()> {
        self.sender
            .send_email(ctx, to, notification.subject(), &notification.body())
            .await
    }
}

/// Renders a validity period in the largest whole unit.
fn describe(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (n, unit) = if secs >= 86_400 && secs % 86_400 == 0 {
        (secs / 86_400, "day")
    } else if secs >= 3_600 && secs % 3_600 == 0 {
        (secs / 3_600, "hour")
    } else if secs >= 60 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Outbox(Mutex<Vec<(String, String, String)>>);

    impl EmailSender for Outbox {
        async fn send_email(&self, _: &SendContext, to: &str, subject: &str, body: &str) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    #[test]
    fn link_joins_base_and_token() {
        let notifier = Notifier::new(Outbox::default(), "https://app.example.com/").unwrap();
        assert_eq!(
            notifier.link("/verify-email", "abc+/= x").unwrap().as_str(),
            "https://app.example.com/verify-email?token=abc%2B%2F%3D+x"
        );
    }

    #[test]
    fn link_keeps_base_path() {
        let notifier =
            Notifier::new(Outbox::default(), "https://example.com/app?ref=mail").unwrap();
        assert_eq!(
            notifier.link("activate", "t1").unwrap().as_str(),
            "https://example.com/app/activate?token=t1"
        );

        let slashed = Notifier::new(Outbox::default(), "https://example.com/app/").unwrap();
        assert_eq!(
            slashed.link("reset-password", "t2").unwrap().as_str(),
            "https://example.com/app/reset-password?token=t2"
        );
    }

    #[test]
    fn rejects_unusable_base_url() {
        let err = Notifier::new(Outbox::default(), "not a url").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);

        let err = Notifier::new(Outbox::default(), "mailto:ops@example.com").unwrap_err();
        assert!(err.to_string().contains("cannot carry a path"));
    }

    #[tokio::test]
    async fn password_reset_mentions_expiry() {
        let notifier = Notifier::new(Outbox::default(), "https://app.example.com").unwrap();
        notifier
            .send_password_reset(
                &SendContext::background(),
                "bob@example.com",
                "tok",
                Duration::from_secs(3_600),
            )
            .await
            .unwrap();

        let sent = notifier.sender().0.lock().unwrap();
        let (to, subject, body) = &sent[0];
        assert_eq!(to, "bob@example.com");
        assert_eq!(subject, "Reset your password");
        assert!(body.contains("https://app.example.com/reset-password?token=tok"));
        assert!(body.contains("1 hour"));
    }

    #[tokio::test]
    async fn verification_and_activation() {
        let notifier = Notifier::new(Outbox::default(), "https://app.example.com").unwrap();
        let ctx = SendContext::background();
        notifier.send_verification(&ctx, "a@x.com", "v1").await.unwrap();
        notifier.send_activation(&ctx, "b@x.com", "a1").await.unwrap();

        let sent = notifier.sender().0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].2.contains("/verify-email?token=v1"));
        assert_eq!(sent[1].1, "Activate your account");
        assert!(sent[1].2.contains("/activate?token=a1"));
    }

    #[test]
    fn describes_durations() {
        assert_eq!(describe(Duration::from_secs(86_400 * 2)), "2 days");
        assert_eq!(describe(Duration::from_secs(7_200)), "2 hours");
        assert_eq!(describe(Duration::from_secs(900)), "15 minutes");
        assert_eq!(describe(Duration::from_secs(1)), "1 second");
    }
}
