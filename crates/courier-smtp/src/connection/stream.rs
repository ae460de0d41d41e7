//! Low-level SMTP stream handling.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadBuf,
};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use super::IoGuard;
use crate::error::{Error, Result};
use crate::parser::is_last_reply_line;

/// Longest reply line accepted from a server.
///
/// RFC 5321 limits reply lines to 512 octets; some servers are sloppy, so
/// allow generous headroom while still bounding memory.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Upper bound on the number of lines read for one reply.
pub const MAX_REPLY_LINES: usize = 128;

/// Opens transports for a session and upgrades them to TLS.
///
/// The production implementation is [`TcpConnector`]; tests substitute
/// in-memory transports.
pub trait Connector: Send + Sync {
    /// Transport type, identical before and after the TLS upgrade.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Opens a connection to `host:port`.
    fn connect(
        &self,
        host: &str,
        port: u16,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Performs the client side of a TLS handshake over `stream`.
    fn upgrade(
        &self,
        stream: Self::Stream,
        host: &str,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Buffered SMTP stream bounded by an [`IoGuard`].
#[derive(Debug)]
pub struct SmtpStream<S> {
    reader: BufReader<S>,
    guard: IoGuard,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SmtpStream<S> {
    /// Wraps a transport.
    pub fn new(stream: S, guard: IoGuard) -> Self {
        Self {
            reader: BufReader::new(stream),
            guard,
        }
    }

    /// Reads one complete reply, without line endings.
    ///
    /// The whole reply, continuation lines included, runs under a single
    /// guard operation. Every line read counts towards [`MAX_REPLY_LINES`],
    /// blank ones too.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails, the peer closed the connection,
    /// a line is too long, the reply has too many lines, or the guard fires.
    pub async fn read_reply_lines(&mut self) -> Result<Vec<String>> {
        let Self { reader, guard } = self;
        guard
            .run("reading reply", async {
                let mut lines = Vec::new();
                for _ in 0..MAX_REPLY_LINES {
                    let line = read_bounded_line(&mut *reader).await?;
                    if line.is_empty() {
                        continue;
                    }
                    let is_last = is_last_reply_line(&line);
                    lines.push(line);
                    if is_last {
                        return Ok(lines);
                    }
                }
                Err(Error::Protocol(format!(
                    "Reply exceeds {MAX_REPLY_LINES} lines"
                )))
            })
            .await
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the guard fires.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let Self { reader, guard } = self;
        guard
            .run("writing to server", async {
                let stream = reader.get_mut();
                stream.write_all(data).await?;
                stream.flush().await?;
                Ok::<_, Error>(())
            })
            .await
    }

    /// Returns true if the server sent bytes that have not been consumed yet.
    #[must_use]
    pub fn has_buffered_data(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    /// Shuts down the write half of the transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown fails or the guard fires.
    pub async fn shutdown(&mut self) -> Result<()> {
        let Self { reader, guard } = self;
        guard
            .run("closing connection", async {
                reader.get_mut().shutdown().await.map_err(Error::from)
            })
            .await
    }

    /// Returns the guard bounding this stream.
    #[must_use]
    pub const fn guard(&self) -> &IoGuard {
        &self.guard
    }

    /// Unwraps the transport, discarding any buffered input.
    pub fn into_parts(self) -> (S, IoGuard) {
        (self.reader.into_inner(), self.guard)
    }
}

async fn read_bounded_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut line = String::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64)
        .read_line(&mut line)
        .await?;

    if n == 0 {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )));
    }
    if !line.ends_with('\n') && n >= MAX_LINE_LENGTH {
        return Err(Error::Protocol(format!(
            "Reply line exceeds {MAX_LINE_LENGTH} bytes"
        )));
    }

    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// A stream that can be either plaintext or TLS.
#[derive(Debug)]
pub enum MailStream {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for MailStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MailStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Connects over TCP and upgrades with rustls.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    tls: Arc<ClientConfig>,
}

impl TcpConnector {
    /// Creates a connector trusting the webpki root certificates.
    #[must_use]
    pub fn new() -> Self {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };

        let config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Self::with_tls_config(Arc::new(config))
    }

    /// Creates a connector with a caller supplied TLS configuration.
    #[must_use]
    pub fn with_tls_config(config: Arc<ClientConfig>) -> Self {
        Self { tls: config }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for TcpConnector {
    type Stream = MailStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<MailStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(MailStream::Plain(stream))
    }

    async fn upgrade(&self, stream: MailStream, host: &str) -> Result<MailStream> {
        let tcp = match stream {
            MailStream::Plain(tcp) => tcp,
            MailStream::Tls(_) => return Err(Error::InvalidState("Stream is already TLS".into())),
        };

        let server_name = ServerName::try_from(host.to_string())
            .map_err(|_| Error::Protocol(format!("Invalid hostname: {host}")))?;

        let connector = TlsConnector::from(Arc::clone(&self.tls));
        let tls = connector.connect(server_name, tcp).await?;
        Ok(MailStream::Tls(Box::new(tls)))
    }
}
