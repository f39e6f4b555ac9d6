//! Async language-server client.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use lsp_types::notification::{
    Cancel, DidCloseTextDocument, DidOpenTextDocument, Exit, Initialized, LogMessage,
    Notification as _,
};
use lsp_types::request::{
    DocumentSymbolRequest, GotoDefinition, HoverRequest, Initialize, References,
    RegisterCapability, Request as LspRequest, ShowMessageRequest, Shutdown,
    UnregisterCapability, WorkDoneProgressCreate, WorkspaceConfiguration,
    WorkspaceFoldersRequest,
};
use lsp_types::{
    ClientInfo, DidCloseTextDocumentParams, DidOpenTextDocumentParams, DocumentSymbolParams,
    DocumentSymbolResponse, GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverParams,
    InitializeParams, Location, LogMessageParams, MessageType, PartialResultParams, Position,
    ReferenceContext, ReferenceParams, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentPositionParams, Uri, WorkDoneProgressParams, WorkspaceFolder,
};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, trace, warn};

use super::capabilities::{
    CLIENT_NAME, DEFAULT_CONNECT_TIMEOUT, DEFAULT_INITIALIZE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SHUTDOWN_TIMEOUT, READ_CHUNK_SIZE,
};
use super::error::LspError;
use super::framing::{FrameBuffer, Framer, DEFAULT_MAX_BODY_LEN};
use super::message::{Message, Notification, Request, RequestId, Response, ResponseError};
use super::pending::{PendingGuard, PendingRequests};
use super::process::{ServerProcess, ShutdownTimeouts};
use super::provider::{LspProvider, Transport};
use super::state::{ClientState, StateCell};
use super::transport::{connect_tcp, BoxedReader, BoxedWriter, FrameWriter};
use super::uri::path_to_uri;
use super::Result;

/// Server requests acknowledged with a `null` result.
const ACKNOWLEDGED_REQUESTS: &[&str] = &[
    WorkDoneProgressCreate::METHOD,
    RegisterCapability::METHOD,
    UnregisterCapability::METHOD,
    ShowMessageRequest::METHOD,
];

/// Callback invoked for a server notification.
pub type NotificationHandler = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Deadlines and limits for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Deadline for ordinary requests.
    pub request_timeout: Duration,
    /// Deadline for the `initialize` request.
    pub initialize_timeout: Duration,
    /// Deadline for the `shutdown` request.
    pub shutdown_timeout: Duration,
    /// How long to keep dialling a socket-mode server.
    pub connect_timeout: Duration,
    /// Process escalation timeouts used by `stop()`.
    pub process: ShutdownTimeouts,
    /// Largest frame body accepted from the server.
    pub max_body_len: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            initialize_timeout: DEFAULT_INITIALIZE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            process: ShutdownTimeouts::default(),
            max_body_len: DEFAULT_MAX_BODY_LEN,
        }
    }
}

/// Per-call overrides for [`LspClient::send_request`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Use this id instead of allocating one.
    pub id: Option<RequestId>,
    /// Use this deadline instead of the client default.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Send with a caller-chosen id.
    #[must_use]
    pub fn id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Send with a custom deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// State shared between the client handle and its read loop.
struct Shared {
    state: StateCell,
    pending: PendingRequests,
    writer: FrameWriter,
    framer: Framer,
    handlers: RwLock<HashMap<String, NotificationHandler>>,
    workspace_folders: RwLock<Value>,
}

impl Shared {
    fn new(framer: Framer) -> Self {
        Self {
            state: StateCell::new(),
            pending: PendingRequests::default(),
            writer: FrameWriter::new(framer),
            framer,
            handlers: RwLock::new(HashMap::new()),
            workspace_folders: RwLock::new(Value::Null),
        }
    }

    fn handle_incoming(self: &Arc<Self>, value: Value) {
        let message = match Message::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                let e = LspError::from(e);
                warn!(error = %e, "dropping JSON-RPC message");
                return;
            }
        };

        match message {
            Message::Response(response) => self.resolve_response(response),
            Message::Request(request) => self.reply_to_server(&request),
            Message::Notification(notification) => self.dispatch_notification(notification),
        }
    }

    /// Write the answer from its own task; the read loop never waits on the
    /// writer lock.
    fn reply_to_server(self: &Arc<Self>, request: &Request) {
        let reply = self.answer_server_request(request);
        let method = request.method.clone();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = shared.writer.send(&reply).await {
                warn!(%method, error = %e, "failed to answer server request");
            }
        });
    }

    fn resolve_response(&self, response: Response) {
        let id = response.id.clone();
        let outcome = response
            .into_outcome()
            .map_err(|e| LspError::server_error(e.code, e.message));

        if self.pending.resolve(&id, outcome) {
            trace!(%id, "received LSP response");
        } else {
            debug!(%id, "dropping response for unknown or expired request");
        }
    }

    fn answer_server_request(&self, request: &Request) -> Message {
        let id = request.id.clone();
        let method = request.method.as_str();
        trace!(method, %id, "server request");

        if method == WorkspaceConfiguration::METHOD {
            let items = request
                .params
                .as_ref()
                .and_then(|params| params.get("items"))
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            Message::response_ok(id, Value::Array(vec![Value::Null; items]))
        } else if method == WorkspaceFoldersRequest::METHOD {
            let folders = self
                .workspace_folders
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            Message::response_ok(id, folders)
        } else if ACKNOWLEDGED_REQUESTS.contains(&method) {
            Message::response_ok(id, Value::Null)
        } else {
            debug!(method, "rejecting unsupported server request");
            Message::response_err(id, ResponseError::method_not_found(method))
        }
    }

    fn dispatch_notification(&self, notification: Notification) {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&notification.method)
            .cloned();

        match handler {
            Some(handler) => handler(notification.params),
            None => trace!(method = %notification.method, "ignoring notification"),
        }
    }

    fn register_handler(&self, method: String, handler: NotificationHandler) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method, handler);
    }

    /// Mark the session dead and fail every waiter.
    fn fail_session(&self) {
        self.state.fail();
        let failed = self.pending.fail_all(|_| LspError::ServerExited);
        if failed > 0 {
            debug!(failed, "failed outstanding requests");
        }
    }

    fn connection_lost(&self, error: Option<&std::io::Error>) {
        let state = self.state.get();
        if matches!(state, ClientState::ShuttingDown | ClientState::Disconnected) {
            debug!(%state, "language server output closed");
            return;
        }
        match error {
            Some(e) => warn!(%state, error = %e, "lost connection to language server"),
            None => warn!(%state, "language server closed its output stream"),
        }
        self.fail_session();
    }
}

async fn read_loop(shared: Arc<Shared>, mut reader: BoxedReader) {
    let mut frames = FrameBuffer::new(shared.framer);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                shared.connection_lost(None);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                shared.connection_lost(Some(&e));
                return;
            }
        };

        frames.extend(&chunk[..n]);
        while let Some(frame) = frames.next_frame() {
            match frame {
                Ok(value) => shared.handle_incoming(value),
                Err(e) => {
                    let e = LspError::from(e);
                    warn!(error = %e, "skipping malformed LSP frame");
                }
            }
        }
    }
}

#[derive(Default)]
struct Session {
    reader: Option<JoinHandle<()>>,
    process: Option<ServerProcess>,
}

/// Client for one language-server session.
///
/// All methods take `&self`; wrap the client in an [`Arc`] to issue queries
/// from several tasks. Lifecycle calls (`start`, `attach`, `stop`) are
/// serialized internally.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use lodestar::lsp::{path_to_uri, ClientOptions, LspClient, PylspProvider};
///
/// # async fn run() -> lodestar::lsp::Result<()> {
/// let client = LspClient::new(
///     Arc::new(PylspProvider::default()),
///     "/path/to/project",
///     ClientOptions::default(),
/// );
/// client.start().await?;
///
/// let uri = path_to_uri("/path/to/project/app.py".as_ref())?;
/// let definitions = client.get_definition(&uri, 10, 4).await?;
///
/// client.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct LspClient {
    provider: Arc<dyn LspProvider>,
    workspace_root: PathBuf,
    options: ClientOptions,
    shared: Arc<Shared>,
    next_id: AtomicI64,
    session: tokio::sync::Mutex<Session>,
    server_capabilities: RwLock<Option<Value>>,
}

impl LspClient {
    /// Create a disconnected client.
    ///
    /// A `window/logMessage` handler that forwards server logs to `tracing`
    /// is registered up front.
    pub fn new(
        provider: Arc<dyn LspProvider>,
        workspace_root: impl Into<PathBuf>,
        options: ClientOptions,
    ) -> Self {
        let shared = Arc::new(Shared::new(Framer::new(options.max_body_len)));
        shared.register_handler(LogMessage::METHOD.to_string(), Arc::new(forward_log_message));

        Self {
            provider,
            workspace_root: workspace_root.into(),
            options,
            shared,
            next_id: AtomicI64::new(1),
            session: tokio::sync::Mutex::new(Session::default()),
            server_capabilities: RwLock::new(None),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.shared.state.get()
    }

    /// Whether queries are accepted.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state() == ClientState::Initialized
    }

    /// Number of requests awaiting a response.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }

    /// The `capabilities` object from the last successful handshake.
    #[must_use]
    pub fn server_capabilities(&self) -> Option<Value> {
        self.server_capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The backend this client launches.
    #[must_use]
    pub fn provider(&self) -> &dyn LspProvider {
        self.provider.as_ref()
    }

    /// The workspace root sent to the server.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Spawn the server, connect to it, and complete the handshake.
    ///
    /// Only legal from `Disconnected`. On failure the client is left in
    /// `Error` with everything torn down; call [`stop`](Self::stop) before
    /// starting again.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The client is not `Disconnected`
    /// - The server executable is not found or fails to spawn
    /// - The socket cannot be reached (socket backends)
    /// - The initialize handshake fails, times out, or lacks required
    ///   capabilities
    pub async fn start(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        self.shared.state.transition(ClientState::Connecting)?;

        let outcome = self.launch(&mut session).await;
        self.finish_startup(&mut session, outcome).await
    }

    /// Run the handshake over already-open streams instead of spawning.
    ///
    /// Useful for servers managed elsewhere and for in-process test servers.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start), minus the spawn failures.
    pub async fn attach<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut session = self.session.lock().await;
        self.shared.state.transition(ClientState::Connecting)?;

        let outcome = self
            .open_session(&mut session, Box::new(reader), Box::new(writer))
            .await;
        self.finish_startup(&mut session, outcome).await
    }

    async fn launch(&self, session: &mut Session) -> Result<()> {
        let mut process = ServerProcess::spawn(self.provider.as_ref(), &self.workspace_root)?;

        let streams: Result<(BoxedReader, BoxedWriter)> = match self.provider.transport() {
            Transport::Stdio => process
                .take_stdio()
                .map(|(stdout, stdin)| (Box::new(stdout) as BoxedReader, Box::new(stdin) as BoxedWriter)),
            Transport::Tcp { host, port } => {
                connect_tcp(&host, port, self.options.connect_timeout)
                    .await
                    .map(|stream| {
                        let (read, write) = stream.into_split();
                        (Box::new(read) as BoxedReader, Box::new(write) as BoxedWriter)
                    })
            }
        };
        session.process = Some(process);

        let (reader, writer) = streams?;
        self.open_session(session, reader, writer).await
    }

    async fn open_session(
        &self,
        session: &mut Session,
        reader: BoxedReader,
        writer: BoxedWriter,
    ) -> Result<()> {
        self.shared.writer.install(writer).await;
        self.shared.state.transition(ClientState::Connected)?;
        session.reader = Some(tokio::spawn(read_loop(Arc::clone(&self.shared), reader)));

        self.initialize().await
    }

    async fn finish_startup(&self, session: &mut Session, outcome: Result<()>) -> Result<()> {
        if let Err(e) = &outcome {
            error!(server = self.provider.name(), error = %e, "language server startup failed");
            self.shared.state.force(ClientState::Error);
            self.teardown(session).await;
        }
        outcome
    }

    /// Perform the `initialize` / `initialized` handshake.
    #[allow(deprecated)] // root_uri is deprecated but still read by many servers
    async fn initialize(&self) -> Result<()> {
        let root_uri = path_to_uri(&self.workspace_root)?;
        let folder = WorkspaceFolder {
            uri: root_uri.clone(),
            name: self
                .workspace_root
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("workspace")
                .to_string(),
        };
        *self
            .shared
            .workspace_folders
            .write()
            .unwrap_or_else(PoisonError::into_inner) = json!([folder]);

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            client_info: Some(ClientInfo {
                name: CLIENT_NAME.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            root_uri: Some(root_uri),
            workspace_folders: Some(vec![folder]),
            capabilities: self.provider.client_capabilities(),
            initialization_options: self.provider.initialize_options(),
            ..Default::default()
        };
        let params = serde_json::to_value(params).map_err(LspError::Serialize)?;

        self.shared.state.transition(ClientState::Initializing)?;
        debug!(server = self.provider.name(), "sending initialize");
        let result = self
            .dispatch(
                Initialize::METHOD,
                Some(params),
                RequestOptions::default().timeout(self.options.initialize_timeout),
            )
            .await?;

        self.provider.validate_initialize(&result)?;
        *self
            .server_capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner) = result.get("capabilities").cloned();

        self.notify(Initialized::METHOD, Some(json!({}))).await?;
        self.shared.state.transition(ClientState::Initialized)?;
        debug!(server = self.provider.name(), "language server initialized");
        Ok(())
    }

    /// Shut the session down and stop the server process.
    ///
    /// From `Initialized`/`Connected` this sends `shutdown` and `exit` first;
    /// from `Error` it only tears down. A no-op when `Disconnected`. Every
    /// pending request is resolved with [`LspError::Cancelled`].
    ///
    /// # Errors
    ///
    /// Teardown problems are logged rather than returned; the result is
    /// reserved for future lifecycle checks.
    pub async fn stop(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let state = self.state();
        if state == ClientState::Disconnected {
            return Ok(());
        }

        if matches!(state, ClientState::Initialized | ClientState::Connected) {
            debug!(server = self.provider.name(), "shutting down language server");
            if let Err(e) = self
                .dispatch(
                    Shutdown::METHOD,
                    None,
                    RequestOptions::default().timeout(self.options.shutdown_timeout),
                )
                .await
            {
                warn!(error = %e, "shutdown request failed, continuing teardown");
            }
            // The server may hang up as soon as it reads `exit`; that EOF is expected.
            self.shared.state.force(ClientState::ShuttingDown);
            if let Err(e) = self
                .shared
                .writer
                .send(&Message::notification(Exit::METHOD, None))
                .await
            {
                debug!(error = %e, "could not send exit notification");
            }
        }

        // Teardown must finish in a known state whatever failed above.
        self.shared.state.force(ClientState::ShuttingDown);
        self.teardown(&mut session).await;
        self.shared.state.force(ClientState::Disconnected);
        debug!(server = self.provider.name(), "language server stopped");
        Ok(())
    }

    async fn teardown(&self, session: &mut Session) {
        if let Some(reader) = session.reader.take() {
            reader.abort();
            let _ = reader.await;
        }
        self.shared.writer.close().await;

        if let Some(mut process) = session.process.take() {
            match process.stop(self.options.process).await {
                Ok(outcome) => debug!(?outcome, "language server process stopped"),
                Err(e) => warn!(error = %e, "failed to stop language server process"),
            }
        }

        let cancelled = self.shared.pending.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "cancelled outstanding requests");
        }
        *self
            .server_capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn ensure_initialized(&self) -> Result<()> {
        match self.state() {
            ClientState::Initialized => Ok(()),
            state => Err(LspError::NotInitialized { state }),
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns [`LspError::NotInitialized`] outside `Initialized`,
    /// [`LspError::DuplicateRequestId`] if a supplied id is in flight,
    /// [`LspError::Timeout`] when the deadline passes, and
    /// [`LspError::ServerError`] when the server answers with an error.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        self.ensure_initialized()?;
        self.dispatch(method, params, options).await
    }

    /// Typed wrapper over [`send_request`](Self::send_request).
    ///
    /// # Errors
    ///
    /// As `send_request`, plus (de)serialization failures.
    pub async fn request<R: LspRequest>(&self, params: R::Params) -> Result<R::Result> {
        self.ensure_initialized()?;
        let params = serde_json::to_value(params).map_err(LspError::Serialize)?;
        let value = self
            .dispatch(R::METHOD, Some(params), RequestOptions::default())
            .await?;
        serde_json::from_value(value).map_err(LspError::Deserialize)
    }

    async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value> {
        let id = options.id.unwrap_or_else(|| self.next_request_id());
        let after = options.timeout.unwrap_or(self.options.request_timeout);

        let receiver = self
            .shared
            .pending
            .register(id.clone(), method, Instant::now() + after)?;
        // Removes the entry however this future ends, including when dropped.
        let _guard = PendingGuard::new(&self.shared.pending, id.clone());

        let request = Message::request(id.clone(), method, params);
        if let Err(e) = self.shared.writer.send(&request).await {
            warn!(method, %id, error = %e, "failed to send LSP request");
            if e.is_transport() {
                self.shared.fail_session();
            }
            return Err(e);
        }

        match timeout(after, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(LspError::Cancelled { id }),
            Err(_) => {
                warn!(method, %id, ?after, "LSP request timed out");
                Err(LspError::Timeout {
                    method: method.to_string(),
                    id,
                    after,
                })
            }
        }
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// Returns [`LspError::NotInitialized`] outside `Initialized`, or the
    /// transport error if the write fails.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.ensure_initialized()?;
        self.notify(method, params).await
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let result = self
            .shared
            .writer
            .send(&Message::notification(method, params))
            .await;
        if let Err(e) = &result {
            if e.is_transport() {
                self.shared.fail_session();
            }
        }
        result
    }

    /// Cancel one in-flight request.
    ///
    /// Its caller receives [`LspError::Cancelled`] and the server is sent
    /// `$/cancelRequest`. Returns `false` if the id was not pending.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the cancel notification cannot be sent.
    pub async fn cancel_request(&self, id: &RequestId) -> Result<bool> {
        if !self.shared.pending.cancel(id) {
            return Ok(false);
        }
        debug!(%id, "cancelled LSP request");
        self.notify(Cancel::METHOD, Some(json!({ "id": id }))).await?;
        Ok(true)
    }

    /// Register `handler` for notifications with `method`, replacing any
    /// existing handler.
    pub fn on_notification<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) + Send + Sync + 'static,
    {
        self.shared.register_handler(method.into(), Arc::new(handler));
    }

    /// Find where the symbol at a position is defined.
    ///
    /// # Errors
    ///
    /// See [`send_request`](Self::send_request).
    pub async fn get_definition(
        &self,
        uri: &Uri,
        line: u32,
        character: u32,
    ) -> Result<Option<Vec<Location>>> {
        let params = GotoDefinitionParams {
            text_document_position_params: position_params(uri, line, character),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        let response = self.request::<GotoDefinition>(params).await?;
        Ok(response.map(into_locations))
    }

    /// Find references to the symbol at a position.
    ///
    /// # Errors
    ///
    /// See [`send_request`](Self::send_request).
    pub async fn get_references(
        &self,
        uri: &Uri,
        line: u32,
        character: u32,
        include_declaration: bool,
    ) -> Result<Option<Vec<Location>>> {
        let params = ReferenceParams {
            text_document_position: position_params(uri, line, character),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
            context: ReferenceContext {
                include_declaration,
            },
        };
        self.request::<References>(params).await
    }

    /// Hover information at a position.
    ///
    /// # Errors
    ///
    /// See [`send_request`](Self::send_request).
    pub async fn get_hover(&self, uri: &Uri, line: u32, character: u32) -> Result<Option<Hover>> {
        let params = HoverParams {
            text_document_position_params: position_params(uri, line, character),
            work_done_progress_params: WorkDoneProgressParams::default(),
        };
        self.request::<HoverRequest>(params).await
    }

    /// Symbols declared in a document, flat or hierarchical as the server
    /// chooses.
    ///
    /// # Errors
    ///
    /// See [`send_request`](Self::send_request).
    pub async fn get_document_symbols(&self, uri: &Uri) -> Result<Option<DocumentSymbolResponse>> {
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        };
        self.request::<DocumentSymbolRequest>(params).await
    }

    /// Tell the server a document is open with the given contents.
    ///
    /// # Errors
    ///
    /// See [`send_notification`](Self::send_notification).
    pub async fn did_open(
        &self,
        uri: &Uri,
        language_id: &str,
        version: i32,
        text: &str,
    ) -> Result<()> {
        self.ensure_initialized()?;
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id.to_string(),
                version,
                text: text.to_string(),
            },
        };
        let params = serde_json::to_value(params).map_err(LspError::Serialize)?;
        self.notify(DidOpenTextDocument::METHOD, Some(params)).await
    }

    /// Tell the server a document was closed.
    ///
    /// # Errors
    ///
    /// See [`send_notification`](Self::send_notification).
    pub async fn did_close(&self, uri: &Uri) -> Result<()> {
        self.ensure_initialized()?;
        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        };
        let params = serde_json::to_value(params).map_err(LspError::Serialize)?;
        self.notify(DidCloseTextDocument::METHOD, Some(params)).await
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        // The process itself is killed on drop; just stop the reader and
        // release any waiters.
        if let Some(reader) = self.session.get_mut().reader.take() {
            reader.abort();
        }
        self.shared.pending.cancel_all();
    }
}

fn position_params(uri: &Uri, line: u32, character: u32) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri: uri.clone() },
        position: Position { line, character },
    }
}

/// Flatten every definition response shape into plain locations.
fn into_locations(response: GotoDefinitionResponse) -> Vec<Location> {
    match response {
        GotoDefinitionResponse::Scalar(location) => vec![location],
        GotoDefinitionResponse::Array(locations) => locations,
        GotoDefinitionResponse::Link(links) => links
            .into_iter()
            .map(|link| Location {
                uri: link.target_uri,
                range: link.target_selection_range,
            })
            .collect(),
    }
}

fn forward_log_message(params: Option<Value>) {
    let Some(params) = params.and_then(|p| serde_json::from_value::<LogMessageParams>(p).ok())
    else {
        return;
    };

    if params.typ == MessageType::ERROR {
        warn!(message = %params.message, "language server error");
    } else if params.typ == MessageType::WARNING {
        debug!(message = %params.message, "language server warning");
    } else {
        trace!(message = %params.message, "language server log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{LocationLink, Range};
    use tempfile::TempDir;

    fn parse_uri(s: &str) -> Uri {
        s.parse().expect("valid URI")
    }

    #[derive(Debug)]
    struct Missing;

    impl LspProvider for Missing {
        fn name(&self) -> &'static str {
            "missing"
        }

        fn command(&self) -> &'static str {
            "lodestar-test-no-such-language-server"
        }
    }

    #[test]
    fn into_locations_from_scalar() {
        let location = Location {
            uri: parse_uri("file:///app.py"),
            range: Range::default(),
        };

        let locations = into_locations(GotoDefinitionResponse::Scalar(location.clone()));
        assert_eq!(locations, vec![location]);
    }

    #[test]
    fn into_locations_from_empty_array() {
        assert!(into_locations(GotoDefinitionResponse::Array(vec![])).is_empty());
    }

    #[test]
    fn into_locations_from_links_uses_selection_range() {
        let selection = Range::new(Position::new(3, 4), Position::new(3, 9));
        let link = LocationLink {
            origin_selection_range: None,
            target_uri: parse_uri("file:///target.py"),
            target_range: Range::new(Position::new(3, 0), Position::new(8, 0)),
            target_selection_range: selection,
        };

        let locations = into_locations(GotoDefinitionResponse::Link(vec![link]));
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri.as_str(), "file:///target.py");
        assert_eq!(locations[0].range, selection);
    }

    #[test]
    fn request_options_builder_sets_fields() {
        let options = RequestOptions::default()
            .id("custom")
            .timeout(Duration::from_millis(5));
        assert_eq!(options.id, Some(RequestId::from("custom")));
        assert_eq!(options.timeout, Some(Duration::from_millis(5)));
    }

    #[tokio::test]
    async fn queries_fail_fast_when_not_initialized() {
        let client = LspClient::new(Arc::new(Missing), ".", ClientOptions::default());
        let uri = parse_uri("file:///app.py");

        let err = client.get_definition(&uri, 0, 0).await.expect_err("gated");
        assert!(matches!(
            err,
            LspError::NotInitialized {
                state: ClientState::Disconnected
            }
        ));
        assert!(client.did_open(&uri, "python", 1, "").await.is_err());
        assert!(client.send_notification("custom/x", None).await.is_err());
        assert_eq!(client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn stop_when_disconnected_is_a_no_op() {
        let client = LspClient::new(Arc::new(Missing), ".", ClientOptions::default());
        client.stop().await.expect("no-op");
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn failed_start_leaves_error_state_until_stopped() {
        let dir = TempDir::new().expect("tempdir");
        let client = LspClient::new(Arc::new(Missing), dir.path(), ClientOptions::default());

        let err = client.start().await.expect_err("binary is missing");
        assert!(matches!(err, LspError::NotFound { .. }));
        assert_eq!(client.state(), ClientState::Error);

        let again = client.start().await.expect_err("must stop first");
        assert!(matches!(again, LspError::InvalidTransition { .. }));

        client.stop().await.expect("stop");
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[test]
    fn server_requests_are_always_answered() {
        let shared = Shared::new(Framer::default());
        *shared.workspace_folders.write().expect("lock") =
            json!([{"uri": "file:///ws", "name": "ws"}]);

        let request = |method: &str, params: Option<Value>| Request {
            id: RequestId::from(1),
            method: method.to_string(),
            params,
        };

        let config = shared.answer_server_request(&request(
            "workspace/configuration",
            Some(json!({"items": [{"section": "pylsp"}, {"section": "python"}]})),
        ));
        assert_eq!(
            config,
            Message::response_ok(RequestId::from(1), json!([null, null]))
        );

        let folders = shared.answer_server_request(&request("workspace/workspaceFolders", None));
        assert_eq!(
            folders,
            Message::response_ok(RequestId::from(1), json!([{"uri": "file:///ws", "name": "ws"}]))
        );

        for method in ACKNOWLEDGED_REQUESTS {
            let reply = shared.answer_server_request(&request(method, None));
            assert_eq!(reply, Message::response_ok(RequestId::from(1), Value::Null));
        }

        let Message::Response(unknown) =
            shared.answer_server_request(&request("custom/unknown", None))
        else {
            panic!("expected a response");
        };
        assert_eq!(unknown.error.map(|e| e.code), Some(-32601));
    }

    #[tokio::test]
    async fn responses_resolve_while_the_writer_is_stalled() {
        let shared = Arc::new(Shared::new(Framer::default()));
        // Nobody reads the far end, so a large write parks holding the writer lock.
        let (near, _far) = tokio::io::duplex(64);
        shared.writer.install(Box::new(near)).await;

        let stalled = Arc::clone(&shared);
        let blocker = tokio::spawn(async move {
            let big = Message::notification("custom/big", Some(json!("x".repeat(8192))));
            stalled.writer.send(&big).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocker.is_finished());

        let receiver = shared
            .pending
            .register(RequestId::from(7), "custom/q", Instant::now() + Duration::from_secs(5))
            .expect("register");

        shared.handle_incoming(json!({
            "jsonrpc": "2.0",
            "id": "srv-1",
            "method": "workspace/configuration",
            "params": {"items": [{"section": "pylsp"}]},
        }));
        shared.handle_incoming(json!({"jsonrpc": "2.0", "id": 7, "result": "done"}));

        let outcome = timeout(Duration::from_secs(1), receiver)
            .await
            .expect("resolved without waiting on the writer")
            .expect("sender kept");
        assert_eq!(outcome.expect("ok"), json!("done"));
        blocker.abort();
    }
}
