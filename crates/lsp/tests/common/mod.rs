// ==============================================================================
// E2E LSP Test Harness
// ==============================================================================
//
// Exercises the full tower-lsp `Service` pipeline in-process: real
// `LanguageServer` shim, real reactor, supervisor and outbound pump, without
// any transport framing.
//
// `LspService::new()` returns `(LspService<S>, ClientSocket)`:
// - `LspService` implements `tower::Service<Request>`; we send JSON-RPC
//   requests to it directly.
// - `ClientSocket` splits into a stream of server->client messages and a sink
//   for our answers to server-issued requests. Every request the server sends
//   is answered with `null` and also recorded, so tests can inspect it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::{Service, ServiceExt};
use tower_lsp::jsonrpc::{Request, Response};
use tower_lsp::lsp_types::*;
use tower_lsp::LspService;

use mm1_lsp::convert::LineIndex;
use mm1_lsp::server::{Mm1LanguageServer, ServerOptions};
use mm1_lsp::test_util::parse_markers;

/// Default timeout for waiting on server messages.
pub const TIMEOUT: Duration = Duration::from_secs(5);

#[allow(dead_code)]
pub struct LspTestHarness {
    service: LspService<Mm1LanguageServer>,
    /// Buffered server->client messages, drained by a background task.
    notif_rx: mpsc::UnboundedReceiver<Request>,
    next_id: AtomicI64,
    /// Current text and version of each opened file.
    files: BTreeMap<String, (String, i32)>,
    pub shutdown_requested: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl LspTestHarness {
    /// A client without dynamic registration support.
    pub async fn new() -> Self {
        Self::with_capabilities(json!({}), Value::Null).await
    }

    /// Create a harness with explicit client capabilities and
    /// `initializationOptions`.
    pub async fn with_capabilities(capabilities: Value, init_options: Value) -> Self {
        let shutdown_requested = Arc::new(AtomicBool::new(false));
        let flag = shutdown_requested.clone();
        let (service, client_socket) = LspService::new(move |client| {
            Mm1LanguageServer::new(client, ServerOptions::default(), flag)
        });

        let (notif_tx, notif_rx) = mpsc::unbounded_channel();
        let (mut requests, mut responses) = client_socket.split();
        tokio::spawn(async move {
            while let Some(msg) = requests.next().await {
                if let Some(id) = msg.id() {
                    let _ = responses
                        .send(Response::from_ok(id.clone(), Value::Null))
                        .await;
                }
                // Forward all server->client messages; tests can filter as needed.
                let _ = notif_tx.send(msg);
            }
        });

        let mut harness = LspTestHarness {
            service,
            notif_rx,
            next_id: AtomicI64::new(1),
            files: BTreeMap::new(),
            shutdown_requested,
        };

        let mut params = json!({ "capabilities": capabilities });
        if !init_options.is_null() {
            params["initializationOptions"] = init_options;
        }
        let init_request = Request::build("initialize")
            .params(params)
            .id(harness.next_id())
            .finish();
        harness.send_request(init_request).await;

        let initialized = Request::build("initialized").params(json!({})).finish();
        harness.send_notification(initialized).await;

        harness
    }

    pub fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///test/{name}")).unwrap()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Low-level: send a JSON-RPC request and return the response.
    async fn send_request(&mut self, req: Request) -> Option<Response> {
        self.service
            .ready()
            .await
            .expect("service not ready")
            .call(req)
            .await
            .expect("service call failed")
    }

    /// Low-level: send a JSON-RPC notification (no response expected).
    async fn send_notification(&mut self, notif: Request) {
        let _ = self.service.ready().await.unwrap().call(notif).await;
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &mut self,
        method: &'static str,
        params: Value,
    ) -> Option<T> {
        let req = Request::build(method)
            .params(params)
            .id(self.next_id())
            .finish();
        let resp = self.send_request(req).await?;
        let (_id, result) = resp.into_parts();
        let value = result.ok()?;
        serde_json::from_value::<T>(value).ok()
    }

    fn position_params(name: &str, line: u32, character: u32) -> Value {
        json!({
            "textDocument": { "uri": Self::uri(name).as_str() },
            "position": { "line": line, "character": character }
        })
    }

    // ==========================================================================
    // Document lifecycle
    // ==========================================================================

    /// Open `name` with `text` at version 1.
    pub async fn open(&mut self, name: &str, text: &str) {
        self.open_at(name, text, 1).await;
    }

    /// Open `name` with `text` at an explicit version.
    pub async fn open_at(&mut self, name: &str, text: &str, version: i32) {
        self.files
            .insert(name.to_string(), (text.to_string(), version));
        let notif = Request::build("textDocument/didOpen")
            .params(json!({
                "textDocument": {
                    "uri": Self::uri(name).as_str(),
                    "languageId": "mm1",
                    "version": version,
                    "text": text,
                }
            }))
            .finish();
        self.send_notification(notif).await;
    }

    /// Send a full-text change, bumping the version. Returns the new version.
    pub async fn edit(&mut self, name: &str, new_text: &str) -> i32 {
        let entry = self
            .files
            .get_mut(name)
            .expect("edit of a file that was never opened");
        entry.0 = new_text.to_string();
        entry.1 += 1;
        let version = entry.1;

        let notif = Request::build("textDocument/didChange")
            .params(json!({
                "textDocument": { "uri": Self::uri(name).as_str(), "version": version },
                "contentChanges": [{ "text": new_text }]
            }))
            .finish();
        self.send_notification(notif).await;
        version
    }

    /// Send one ranged edit, bumping the version.
    pub async fn edit_range(&mut self, name: &str, range: Range, text: &str) -> i32 {
        let entry = self
            .files
            .get_mut(name)
            .expect("edit of a file that was never opened");
        let change = TextDocumentContentChangeEvent {
            range: Some(range),
            range_length: None,
            text: text.to_string(),
        };
        entry.0 = mm1_lsp::convert::apply_change(&entry.0, &change);
        entry.1 += 1;
        let version = entry.1;

        let notif = Request::build("textDocument/didChange")
            .params(json!({
                "textDocument": { "uri": Self::uri(name).as_str(), "version": version },
                "contentChanges": [change]
            }))
            .finish();
        self.send_notification(notif).await;
        version
    }

    pub async fn close(&mut self, name: &str) {
        self.files.remove(name);
        let notif = Request::build("textDocument/didClose")
            .params(json!({
                "textDocument": { "uri": Self::uri(name).as_str() }
            }))
            .finish();
        self.send_notification(notif).await;
    }

    /// Send an arbitrary notification.
    pub async fn notify(&mut self, method: &'static str, params: Value) {
        let notif = Request::build(method).params(params).finish();
        self.send_notification(notif).await;
    }

    pub async fn change_configuration(&mut self, settings: Value) {
        let notif = Request::build("workspace/didChangeConfiguration")
            .params(json!({ "settings": settings }))
            .finish();
        self.send_notification(notif).await;
    }

    // ==========================================================================
    // LSP requests
    // ==========================================================================

    pub async fn hover(&mut self, name: &str, line: u32, character: u32) -> Option<Hover> {
        self.request("textDocument/hover", Self::position_params(name, line, character))
            .await
    }

    pub async fn goto_def(
        &mut self,
        name: &str,
        line: u32,
        character: u32,
    ) -> Option<GotoDefinitionResponse> {
        self.request(
            "textDocument/definition",
            Self::position_params(name, line, character),
        )
        .await
    }

    pub async fn symbols(&mut self, name: &str) -> Option<DocumentSymbolResponse> {
        self.request(
            "textDocument/documentSymbol",
            json!({ "textDocument": { "uri": Self::uri(name).as_str() } }),
        )
        .await
    }

    pub async fn complete(
        &mut self,
        name: &str,
        line: u32,
        character: u32,
    ) -> Option<CompletionResponse> {
        self.request(
            "textDocument/completion",
            Self::position_params(name, line, character),
        )
        .await
    }

    // ==========================================================================
    // Server -> client messages
    // ==========================================================================

    /// Wait for the next server message with `method`, skipping others.
    /// Returns `None` on timeout.
    pub async fn wait_for(&mut self, method: &str, timeout: Duration) -> Option<Request> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.notif_rx.recv()).await {
                Ok(Some(msg)) if msg.method() == method => return Some(msg),
                Ok(Some(_)) => {}
                Ok(None) => return None, // Channel closed.
                Err(_) => return None,   // Timeout.
            }
        }
    }

    /// Wait for a `publishDiagnostics` notification for the given file.
    pub async fn wait_for_diagnostics(
        &mut self,
        name: &str,
        timeout: Duration,
    ) -> Option<PublishDiagnosticsParams> {
        let expected_uri = Self::uri(name);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let msg = self
                .wait_for("textDocument/publishDiagnostics", remaining)
                .await?;
            if let Some(params) = msg.params() {
                if let Ok(diag_params) =
                    serde_json::from_value::<PublishDiagnosticsParams>(params.clone())
                {
                    if diag_params.uri == expected_uri {
                        return Some(diag_params);
                    }
                }
            }
        }
    }

    /// Wait for diagnostics of `name` published for exactly `version`,
    /// skipping publications for other versions.
    pub async fn wait_for_version(
        &mut self,
        name: &str,
        version: i32,
        timeout: Duration,
    ) -> Option<PublishDiagnosticsParams> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let params = self.wait_for_diagnostics(name, remaining).await?;
            if params.version == Some(version) {
                return Some(params);
            }
        }
    }

    // ==========================================================================
    // Markers
    // ==========================================================================

    /// Parse `-- ^<num>` markers from an opened file's current text.
    pub fn markers(&self, name: &str) -> BTreeMap<u32, Position> {
        let (text, _) = &self.files[name];
        let line_index = LineIndex::new(text.as_str());
        parse_markers(text)
            .into_iter()
            .map(|(id, offset)| (id, line_index.position(offset)))
            .collect()
    }

    // ==========================================================================
    // Shutdown
    // ==========================================================================

    /// Send shutdown + exit. Call this at the end of each test for clean
    /// teardown.
    pub async fn shutdown(&mut self) {
        let shutdown = Request::build("shutdown").id(self.next_id()).finish();
        self.send_request(shutdown).await;

        let exit = Request::build("exit").finish();
        // After exit, service may return ExitedError; that's fine.
        let _ = self.service.call(exit).await;
    }
}
