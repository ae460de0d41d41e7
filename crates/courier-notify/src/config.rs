//! Session configuration for the outbound mailer.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::de::{self, Deserializer};
use serde::Deserialize;

use crate::error::{Result, SendError};

/// Default submission port.
pub const DEFAULT_PORT: u16 = 587;

/// Default EHLO identity.
pub const DEFAULT_CLIENT_NAME: &str = "localhost";

/// Default bound on establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on each command round trip and the TLS handshake.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Host names for which AUTH PLAIN may be sent without TLS.
const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Connection and identity settings for one relay.
///
/// Immutable once built; a [`Mailer`](crate::Mailer) shares it between
/// concurrent sends.
///
/// Deserialises from e.g.
///
/// ```json
/// {
///   "host": "smtp.example.com",
///   "port": "587",
///   "username": "noreply@example.com",
///   "password": "app-password",
///   "from": "noreply@example.com",
///   "command_timeout_secs": 30
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    /// Relay host name.
    pub host: String,

    /// Relay port. Accepts a number or a numeric string.
    #[serde(default = "default_port", deserialize_with = "deserialize_port")]
    pub port: u16,

    /// AUTH username; also the sender when `from` is blank.
    #[serde(default)]
    pub username: String,

    /// AUTH password.
    #[serde(default = "empty_secret")]
    pub password: SecretString,

    /// Default envelope sender.
    #[serde(default)]
    pub from: String,

    /// Name announced in EHLO/HELO.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Bound on establishing the TCP connection.
    #[serde(
        rename = "connect_timeout_secs",
        default = "default_connect_timeout",
        deserialize_with = "deserialize_secs"
    )]
    pub connect_timeout: Duration,

    /// Bound on each command round trip, including the TLS handshake.
    #[serde(
        rename = "command_timeout_secs",
        default = "default_command_timeout",
        deserialize_with = "deserialize_secs"
    )]
    pub command_timeout: Duration,
}

impl SessionConfig {
    /// Starts building a configuration for `host`.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> SessionConfigBuilder {
        SessionConfigBuilder::new(host)
    }

    /// Checks that the configuration can be used to dial.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Configuration`] for an empty host, a zero port,
    /// an unusable client name or a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SendError::Configuration("SMTP host is required".into()));
        }
        if self.port == 0 {
            return Err(SendError::Configuration("SMTP port must be 1-65535".into()));
        }
        if self.client_name.is_empty()
            || self
                .client_name
                .chars()
                .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(SendError::Configuration(format!(
                "invalid client name: {:?}",
                self.client_name
            )));
        }
        if self.connect_timeout.is_zero() || self.command_timeout.is_zero() {
            return Err(SendError::Configuration("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    /// Returns `host:port`, bracketing IPv6 literals.
    #[must_use]
    pub fn address(&self) -> String {
        let host = self.host.trim();
        if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }

    /// Returns the configured sender: `from`, else `username`.
    ///
    /// Whitespace-only values count as blank.
    #[must_use]
    pub fn default_sender(&self) -> Option<&str> {
        [self.from.as_str(), self.username.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Returns true if both username and password are set.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.expose_secret().trim().is_empty()
    }

    /// Returns true if the host names the local machine.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        let host = self.host.trim();
        LOOPBACK_HOSTS
            .iter()
            .any(|name| host.eq_ignore_ascii_case(name))
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    fn new(host: impl Into<String>) -> Self {
        Self {
            config: SessionConfig {
                host: host.into(),
                port: DEFAULT_PORT,
                username: String::new(),
                password: empty_secret(),
                from: String::new(),
                client_name: DEFAULT_CLIENT_NAME.to_string(),
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
                command_timeout: DEFAULT_COMMAND_TIMEOUT,
            },
        }
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the AUTH username and password.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = username.into();
        self.config.password = SecretString::new(password.into());
        self
    }

    /// Sets the default sender.
    #[must_use]
    pub fn sender(mut self, from: impl Into<String>) -> Self {
        self.config.from = from.into();
        self
    }

    /// Sets the EHLO identity.
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// See [`SessionConfig::validate`].
    pub fn build(self) -> Result<SessionConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn empty_secret() -> SecretString {
    SecretString::new(String::new())
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}

const fn default_connect_timeout() -> Duration {
    DEFAULT_CONNECT_TIMEOUT
}

const fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    match PortValue::deserialize(deserializer)? {
        PortValue::Number(port) => Ok(port),
        PortValue::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid port: {text:?}"))),
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_secs)
}
