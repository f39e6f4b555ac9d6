//! In-process fake language server for client integration tests.
//!
//! The client and the fake talk over a `tokio::io::duplex` pipe, so tests
//! control every byte the client sees without spawning a process.

#![allow(dead_code)] // Each test binary uses a different subset.

use std::sync::Arc;
use std::time::Duration;

use lodestar::lsp::{ClientOptions, FrameBuffer, Framer, LspClient, PyrightProvider};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

/// How long the fake waits for the client before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Server side of the pipe.
pub struct FakeServer {
    stream: DuplexStream,
    frames: FrameBuffer,
    framer: Framer,
}

impl FakeServer {
    fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            frames: FrameBuffer::default(),
            framer: Framer::default(),
        }
    }

    /// Next message from the client, or `None` once the client closed.
    pub async fn try_recv(&mut self) -> Option<Value> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = self.frames.next_frame() {
                return Some(frame.expect("client sent a malformed frame"));
            }
            let n = tokio::time::timeout(RECV_TIMEOUT, self.stream.read(&mut chunk))
                .await
                .expect("timed out waiting for the client")
                .expect("read from client");
            if n == 0 {
                return None;
            }
            self.frames.extend(&chunk[..n]);
        }
    }

    /// Next message from the client.
    pub async fn recv(&mut self) -> Value {
        self.try_recv().await.expect("client closed the connection")
    }

    /// Next message, which must have `method`.
    pub async fn expect_method(&mut self, method: &str) -> Value {
        let message = self.recv().await;
        assert_eq!(message["method"], method, "unexpected message: {message}");
        message
    }

    /// Write one framed message.
    pub async fn send(&mut self, message: Value) {
        let frame = self.framer.encode(&message).expect("encode");
        self.send_raw(&frame).await;
    }

    /// Write bytes exactly as given.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write to client");
        self.stream.flush().await.expect("flush");
    }

    /// Answer `request` with a result.
    pub async fn respond(&mut self, request: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    /// Answer `request` with an error.
    pub async fn respond_error(&mut self, request: &Value, code: i64, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    /// Serve `initialize` and wait for `initialized`. Returns the initialize
    /// request.
    pub async fn handshake(&mut self) -> Value {
        let initialize = self.expect_method("initialize").await;
        self.respond(&initialize, server_capabilities()).await;
        self.expect_method("initialized").await;
        initialize
    }

    /// Close the server's output; the client sees end of stream.
    pub async fn hang_up(&mut self) {
        self.stream.shutdown().await.expect("shutdown");
    }
}

/// An `InitializeResult` that satisfies the pyright backend.
pub fn server_capabilities() -> Value {
    json!({
        "capabilities": {
            "textDocumentSync": 1,
            "definitionProvider": true,
            "referencesProvider": true,
            "hoverProvider": true,
            "documentSymbolProvider": true
        },
        "serverInfo": {"name": "fake", "version": "0.0.0"}
    })
}

/// A client wired to a fake server, not yet started.
pub struct Harness {
    pub client: Arc<LspClient>,
    pub server: FakeServer,
    client_end: Option<DuplexStream>,
    pub workspace: TempDir,
}

impl Harness {
    /// Build with custom options.
    pub fn with_options(options: ClientOptions) -> Self {
        let workspace = TempDir::new().expect("tempdir");
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let client = Arc::new(LspClient::new(
            Arc::new(PyrightProvider),
            workspace.path(),
            options,
        ));
        Self {
            client,
            server: FakeServer::new(server_end),
            client_end: Some(client_end),
            workspace,
        }
    }

    /// Build with default options.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    /// The client's ends of the pipe, for a manual `attach`.
    pub fn client_streams(&mut self) -> (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) {
        tokio::io::split(self.client_end.take().expect("streams taken once"))
    }
}

/// A client that has completed the handshake with a fake server.
pub async fn initialized() -> Harness {
    initialized_with(ClientOptions::default()).await
}

/// As [`initialized`], with custom options.
pub async fn initialized_with(options: ClientOptions) -> Harness {
    let mut harness = Harness::with_options(options);
    let (reader, writer) = harness.client_streams();

    let (attached, _) = tokio::join!(
        harness.client.attach(reader, writer),
        harness.server.handshake()
    );
    attached.expect("handshake");
    harness
}

/// A `file://` URI inside the harness workspace.
pub fn workspace_uri(harness: &Harness, file: &str) -> lsp_types::Uri {
    let path = harness.workspace.path().join(file);
    std::fs::write(&path, "").expect("create file");
    lodestar::lsp::path_to_uri(&path).expect("uri")
}
