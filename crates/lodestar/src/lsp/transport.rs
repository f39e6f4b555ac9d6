//! Byte-stream plumbing between the client and a server.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::error::LspError;
use super::framing::Framer;
use super::message::Message;
use super::Result;

/// Interval between TCP connect attempts while a socket server is binding.
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Owned read half of a server connection.
pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Owned write half of a server connection.
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Serializes outgoing messages onto the server's input stream.
///
/// Header and body go out in one `write_all` under the lock, so concurrent
/// senders never interleave partial frames.
pub(crate) struct FrameWriter {
    framer: Framer,
    inner: Mutex<Option<BoxedWriter>>,
}

impl FrameWriter {
    pub(crate) fn new(framer: Framer) -> Self {
        Self {
            framer,
            inner: Mutex::new(None),
        }
    }

    pub(crate) async fn install(&self, writer: BoxedWriter) {
        *self.inner.lock().await = Some(writer);
    }

    /// Frame and write one message.
    ///
    /// Fails with [`LspError::ServerExited`] once the stream has been closed.
    pub(crate) async fn send(&self, message: &Message) -> Result<()> {
        let frame = self
            .framer
            .encode(&message.to_value())
            .map_err(LspError::Serialize)?;

        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(LspError::ServerExited)?;
        writer.write_all(&frame).await?;
        writer.flush().await?;

        trace!(
            method = ?message.method(),
            id = ?message.id(),
            bytes = frame.len(),
            "sent LSP message"
        );
        Ok(())
    }

    /// Shut down and drop the stream. Closing an already-closed writer is a
    /// no-op.
    pub(crate) async fn close(&self) {
        if let Some(mut writer) = self.inner.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(error = %e, "error closing server input stream");
            }
        }
    }
}

/// Connect to a socket-mode server, retrying until `within` elapses.
///
/// The server is spawned just before this is called and may not be listening
/// yet, so refused connections are retried.
pub(crate) async fn connect_tcp(host: &str, port: u16, within: Duration) -> Result<TcpStream> {
    let address = format!("{host}:{port}");
    let deadline = Instant::now() + within;

    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                debug!(%address, "connected to language server socket");
                return Ok(stream);
            }
            Err(e) if Instant::now() < deadline => {
                trace!(%address, error = %e, "language server socket not ready");
                tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
            }
            Err(source) => return Err(LspError::Connect { address, source }),
        }
    }
}
