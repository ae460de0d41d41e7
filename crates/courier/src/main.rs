//! `courier` - send one notification email through an SMTP relay.
//!
//! ```text
//! courier <config.json> <to> <subject> <body|->
//! ```
//!
//! The configuration file holds a `SessionConfig` as JSON. A body of `-`
//! is read from stdin. Ctrl-C cancels the session.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use courier_notify::{CancellationToken, Mailer, Message, SendContext, SessionConfig};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound on a whole send, on top of the per-operation timeouts.
const SEND_DEADLINE: Duration = Duration::from_secs(120);

/// Parsed command line.
struct Args {
    config: PathBuf,
    to: String,
    subject: String,
    body: String,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let program = args.next().unwrap_or_else(|| "courier".into());
        let rest: Vec<String> = args.collect();
        let [config, to, subject, body] = <[String; 4]>::try_from(rest).map_err(|_| {
            anyhow::anyhow!("usage: {program} <config.json> <to> <subject> <body|->")
        })?;
        Ok(Self {
            config: config.into(),
            to,
            subject,
            body,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=info,courier_notify=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse(std::env::args())?;
    let config = load_config(&args.config).await?;
    let body = if args.body == "-" {
        read_stdin().await?
    } else {
        args.body
    };

    info!(server = %config.address(), "sending notification");
    let mailer = Mailer::new(config);

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling send");
            on_signal.cancel();
        }
    });

    let ctx = SendContext::with_timeout(SEND_DEADLINE).with_cancellation(token);
    mailer
        .send(&ctx, &Message::new(args.to.as_str(), args.subject, body))
        .await
        .with_context(|| format!("failed to send to {}", args.to))?;

    info!("done");
    Ok(())
}

async fn load_config(path: &Path) -> Result<SessionConfig> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config: SessionConfig = serde_json::from_str(&contents)
        .with_context(|| format!("invalid configuration in {}", path.display()))?;
    config.validate()?;
    if config.default_sender().is_none() {
        bail!("{}: either \"from\" or \"username\" must be set", path.display());
    }
    Ok(config)
}

async fn read_stdin() -> Result<String> {
    let mut body = String::new();
    tokio::io::stdin()
        .read_to_string(&mut body)
        .await
        .context("failed to read body from stdin")?;
    Ok(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        Args::parse(list.iter().map(ToString::to_string))
    }

    #[test]
    fn parses_positional_arguments() {
        let parsed = args(&["courier", "cfg.json", "bob@example.com", "Hi", "Hello"]).unwrap();
        assert_eq!(parsed.config, PathBuf::from("cfg.json"));
        assert_eq!(parsed.to, "bob@example.com");
        assert_eq!(parsed.subject, "Hi");
        assert_eq!(parsed.body, "Hello");
    }

    #[test]
    fn wrong_arity_prints_usage() {
        let err = args(&["courier", "cfg.json"]).err().unwrap();
        assert!(err.to_string().starts_with("usage: courier"));
    }

    #[tokio::test]
    async fn rejects_config_without_sender() {
        let path = std::env::temp_dir().join(format!("courier-test-{}.json", std::process::id()));
        tokio::fs::write(&path, r#"{"host": "smtp.example.com", "port": "587"}"#)
            .await
            .unwrap();
        let err = load_config(&path).await.err().unwrap();
        let _ = tokio::fs::remove_file(&path).await;
        assert!(err.to_string().contains("\"from\" or \"username\""));
    }
}
