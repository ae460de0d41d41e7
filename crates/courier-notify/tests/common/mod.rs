//! In-memory SMTP server and connector used by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use courier_smtp::Connector;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
    ReadBuf,
};
use tokio::task::JoinHandle;

/// Routes log output through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            "courier_notify=debug,courier_smtp=debug",
        ))
        .with_test_writer()
        .try_init();
}

/// How the fake server behaves.
#[derive(Debug, Clone)]
pub struct ServerBehavior {
    /// Never send the greeting; just drain input until EOF.
    pub silent: bool,
    /// Greeting line.
    pub greeting: &'static str,
    /// Advertise STARTTLS.
    pub starttls: bool,
    /// Answer STARTTLS with this reply.
    pub starttls_reply: &'static str,
    /// Push extra bytes right after the STARTTLS `220`.
    pub pipeline_after_starttls: bool,
    /// Answer AUTH and MAIL with `530` until STARTTLS completed.
    pub require_tls: bool,
    /// Advertise `AUTH PLAIN LOGIN`.
    pub auth: bool,
    /// Reply to AUTH.
    pub auth_reply: &'static str,
    /// Reply to EHLO is rejected with this line instead of the capability list.
    pub ehlo_reject: Option<&'static str>,
    /// Reply to MAIL FROM.
    pub mail_reply: &'static str,
    /// Reply to RCPT TO.
    pub rcpt_reply: &'static str,
    /// Reply to DATA.
    pub data_reply: &'static str,
    /// Reply after the end-of-data marker.
    pub queued_reply: &'static str,
    /// Reply to QUIT; `None` hangs up without answering.
    pub quit_reply: Option<&'static str>,
    /// Stop answering (but keep reading) once this verb arrives.
    pub stall_on: Option<&'static str>,
}

impl Default for ServerBehavior {
    fn default() -> Self {
        Self {
            silent: false,
            greeting: "220 fake.local ESMTP ready",
            starttls: true,
            starttls_reply: "220 2.0.0 Ready to start TLS",
            pipeline_after_starttls: false,
            require_tls: true,
            auth: true,
            auth_reply: "235 2.7.0 Authentication successful",
            ehlo_reject: None,
            mail_reply: "250 2.1.0 OK",
            rcpt_reply: "250 2.1.5 OK",
            data_reply: "354 End data with <CR><LF>.<CR><LF>",
            queued_reply: "250 2.0.0 Queued",
            quit_reply: Some("221 2.0.0 Bye"),
            stall_on: None,
        }
    }
}

impl ServerBehavior {
    /// A relay that offers neither STARTTLS nor AUTH.
    pub fn plain() -> Self {
        Self {
            starttls: false,
            auth: false,
            ..Self::default()
        }
    }
}

/// What the fake server saw during one session.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    /// Command lines in arrival order, `<TLS>` marking the upgrade point.
    pub commands: Vec<String>,
    /// The message as received after DATA, with dot-stuffing undone.
    pub data: Option<String>,
}

impl Transcript {
    /// Command verbs in arrival order (`MAIL FROM:<a@b>` becomes `MAIL`).
    pub fn verbs(&self) -> Vec<String> {
        self.commands
            .iter()
            .map(|line| {
                line.split([' ', ':'])
                    .next()
                    .unwrap_or_default()
                    .to_ascii_uppercase()
            })
            .collect()
    }

    /// Returns true if a command starting with `prefix` was received.
    pub fn saw(&self, prefix: &str) -> bool {
        self.commands.iter().any(|c| c.starts_with(prefix))
    }
}

async fn reply<W: AsyncWrite + Unpin>(write: &mut W, text: &str) {
    let _ = write.write_all(format!("{text}\r\n").as_bytes()).await;
}

fn ehlo_reply(behavior: &ServerBehavior, tls: bool) -> String {
    let mut lines = vec!["fake.local greets you".to_string()];
    if behavior.starttls && !tls {
        lines.push("STARTTLS".into());
    }
    if behavior.auth {
        lines.push("AUTH PLAIN LOGIN".into());
    }
    lines.push("8BITMIME".into());

    let last = lines.len() - 1;
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let sep = if i == last { ' ' } else { '-' };
            format!("250{sep}{line}")
        })
        .collect::<Vec<_>>()
        .join("\r\n")
}

/// Runs one SMTP session over `stream`.
pub async fn serve<S>(stream: S, behavior: ServerBehavior) -> Transcript
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read, mut write) = tokio::io::split(stream);
    let mut reader = BufReader::new(read);
    let mut transcript = Transcript::default();

    if behavior.silent {
        let mut sink = Vec::new();
        let _ = reader.read_to_end(&mut sink).await;
        return transcript;
    }

    reply(&mut write, behavior.greeting).await;
    let mut tls = false;
    let mut stalled = false;

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        let verb = line
            .split([' ', ':'])
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        transcript.commands.push(line.clone());

        if stalled || behavior.stall_on == Some(verb.as_str()) {
            stalled = true;
            continue;
        }

        let response = match verb.as_str() {
            "EHLO" => match behavior.ehlo_reject {
                Some(rejection) => rejection.to_string(),
                None => ehlo_reply(&behavior, tls),
            },
            "HELO" => "250 fake.local".to_string(),
            "STARTTLS" if behavior.starttls && !tls => {
                if behavior.pipeline_after_starttls {
                    let injected = format!("{}\r\n250 injected\r\n", behavior.starttls_reply);
                    let _ = write.write_all(injected.as_bytes()).await;
                } else {
                    reply(&mut write, behavior.starttls_reply).await;
                }
                if behavior.starttls_reply.starts_with("220") {
                    tls = true;
                    transcript.commands.push("<TLS>".into());
                }
                continue;
            }
            "AUTH" | "MAIL" if behavior.require_tls && behavior.starttls && !tls => {
                "530 5.7.0 Must issue a STARTTLS command first".to_string()
            }
            "AUTH" if behavior.auth => behavior.auth_reply.to_string(),
            "MAIL" => behavior.mail_reply.to_string(),
            "RCPT" => behavior.rcpt_reply.to_string(),
            "DATA" => {
                reply(&mut write, behavior.data_reply).await;
                if !behavior.data_reply.starts_with("354") {
                    continue;
                }
                let mut data = String::new();
                loop {
                    let mut body_line = String::new();
                    match reader.read_line(&mut body_line).await {
                        Ok(0) | Err(_) => return transcript,
                        Ok(_) => {}
                    }
                    let body_line = body_line.trim_end_matches(['\r', '\n']);
                    if body_line == "." {
                        transcript.commands.push(".".into());
                        break;
                    }
                    let unstuffed = body_line.strip_prefix('.').filter(|_| body_line.starts_with(".."));
                    data.push_str(unstuffed.unwrap_or(body_line));
                    data.push_str("\r\n");
                }
                transcript.data = Some(data);
                behavior.queued_reply.to_string()
            }
            "QUIT" => {
                if let Some(bye) = behavior.quit_reply {
                    reply(&mut write, bye).await;
                }
                break;
            }
            _ => "502 5.5.2 Command not recognized".to_string(),
        };
        reply(&mut write, &response).await;
    }

    transcript
}

/// Transport handed to the client: an in-memory pipe that can be told to
/// fail one large write.
#[derive(Debug)]
pub struct FakeStream {
    inner: DuplexStream,
    fail_writes_over: Option<usize>,
    failed: bool,
}

impl AsyncRead for FakeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for FakeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if !this.failed && this.fail_writes_over.is_some_and(|limit| buf.len() > limit) {
            this.failed = true;
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "injected write failure",
            )));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Connector that spawns a [`serve`] task per connection.
#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    behavior: ServerBehavior,
    fail_upgrade: bool,
    stall_connect: bool,
    fail_writes_over: Option<usize>,
    connects: Arc<AtomicUsize>,
    upgrades: Arc<AtomicUsize>,
    sessions: Arc<Mutex<Vec<JoinHandle<Transcript>>>>,
}

impl FakeConnector {
    pub fn new(behavior: ServerBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// TLS handshakes fail.
    pub fn failing_upgrade(mut self) -> Self {
        self.fail_upgrade = true;
        self
    }

    /// `connect` never completes.
    pub fn stalling_connect(mut self) -> Self {
        self.stall_connect = true;
        self
    }

    /// The first write longer than `limit` bytes fails.
    pub fn failing_writes_over(mut self, limit: usize) -> Self {
        self.fail_writes_over = Some(limit);
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn upgrades(&self) -> usize {
        self.upgrades.load(Ordering::SeqCst)
    }

    /// Waits for every server task and returns their transcripts.
    pub async fn transcripts(&self) -> Vec<Transcript> {
        let handles: Vec<_> = self.sessions.lock().unwrap().drain(..).collect();
        let mut transcripts = Vec::new();
        for handle in handles {
            transcripts.push(handle.await.unwrap());
        }
        transcripts
    }

    /// Transcript of the only session.
    pub async fn transcript(&self) -> Transcript {
        let mut all = self.transcripts().await;
        assert_eq!(all.len(), 1, "expected exactly one session");
        all.remove(0)
    }
}

impl Connector for FakeConnector {
    type Stream = FakeStream;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<FakeStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.stall_connect {
            std::future::pending::<()>().await;
        }

        let (client, server) = tokio::io::duplex(64 * 1024);
        let handle = tokio::spawn(serve(server, self.behavior.clone()));
        self.sessions.lock().unwrap().push(handle);

        Ok(FakeStream {
            inner: client,
            fail_writes_over: self.fail_writes_over,
            failed: false,
        })
    }

    async fn upgrade(&self, stream: FakeStream, _host: &str) -> courier_smtp::Result<FakeStream> {
        self.upgrades.fetch_add(1, Ordering::SeqCst);
        if self.fail_upgrade {
            return Err(courier_smtp::Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "handshake failed",
            )));
        }
        Ok(stream)
    }
}

/// Headers and body recovered from a rendered message.
#[derive(Debug, PartialEq, Eq)]
pub struct Parsed {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub content_type: String,
    pub body: String,
}

/// Splits a rendered message into its headers and body.
///
/// The body is everything after the blank line, minus the final CRLF.
pub fn parse_message(raw: &str) -> Parsed {
    let (head, body) = raw.split_once("\r\n\r\n").unwrap();
    let header = |name: &str| {
        head.split("\r\n")
            .find_map(|line| line.strip_prefix(name).and_then(|v| v.strip_prefix(": ")))
            .unwrap_or_default()
            .to_string()
    };
    Parsed {
        from: header("From"),
        to: header("To"),
        subject: header("Subject"),
        content_type: header("Content-Type"),
        body: body.strip_suffix("\r\n").unwrap_or(body).to_string(),
    }
}
