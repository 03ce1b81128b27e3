// ==============================================================================
// tower-lsp LanguageServer implementation
// ==============================================================================
//
// A thin shim: every callback becomes an `Event` on the reactor's queue.
// Requests carry a oneshot responder and wait for the reactor's answer. The
// tower-lsp `Client` is owned by the outbound pump, never by the reactor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tower_lsp::jsonrpc::{self, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::analysis::{Engine, Mm1Engine};
use crate::reactor::{Event, Reactor, Responder};
use crate::transport::{self, Outbound};

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Overrides `analysis.timeoutMs` from the client.
    pub timeout_override: Option<Duration>,
}

pub struct Mm1LanguageServer {
    events: mpsc::UnboundedSender<Event>,
    shutdown_requested: Arc<AtomicBool>,
}

impl Mm1LanguageServer {
    pub fn new(client: Client, options: ServerOptions, shutdown_requested: Arc<AtomicBool>) -> Self {
        Self::with_engine(client, options, shutdown_requested, Arc::new(Mm1Engine))
    }

    /// Start the reactor and the outbound pump. Must run inside a tokio
    /// runtime.
    pub fn with_engine(
        client: Client,
        options: ServerOptions,
        shutdown_requested: Arc<AtomicBool>,
        engine: Arc<dyn Engine>,
    ) -> Self {
        let (events, event_rx) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = Outbound::channel();

        let reactor = Reactor::new(engine, outbound, options.timeout_override);
        tokio::spawn(reactor.run(event_rx));
        // The pump only holds a weak sender so that dropping the server stops
        // the reactor, which in turn closes the outbound queue.
        tokio::spawn(transport::pump(client, outbound_rx, events.downgrade()));

        Mm1LanguageServer {
            events,
            shutdown_requested,
        }
    }

    fn send(&self, event: Event) {
        if self.events.send(event).is_err() {
            log::error!("reactor is gone, dropping event");
        }
    }

    async fn request<T>(&self, make: impl FnOnce(Responder<T>) -> Event) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply));
        match rx.await {
            Ok(result) => result,
            Err(_) => {
                log::error!("reactor dropped a request without answering");
                Err(jsonrpc::Error::internal_error())
            }
        }
    }

    fn notification(&self, method: &str, params: impl Serialize) {
        self.send(Event::Notification {
            method: method.to_string(),
            params: serde_json::to_value(params).ok(),
        });
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Mm1LanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        if let Some(ref info) = params.client_info {
            log::info!(
                "Client: {}{}",
                info.name,
                info.version
                    .as_deref()
                    .map_or(String::new(), |v| format!(" v{v}")),
            );
        }
        self.request(|reply| Event::Initialize {
            params: Box::new(params),
            reply,
        })
        .await
    }

    async fn initialized(&self, _: InitializedParams) {
        self.send(Event::Initialized);
    }

    async fn shutdown(&self) -> Result<()> {
        log::info!("shutdown requested");
        self.shutdown_requested.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.send(Event::DidOpen(params));
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        self.send(Event::DidChange(params));
    }

    async fn will_save(&self, params: WillSaveTextDocumentParams) {
        self.notification("textDocument/willSave", params);
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.notification("textDocument/didSave", params);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.send(Event::DidClose(params));
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        self.send(Event::DidChangeConfiguration(params));
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        self.send(Event::DidChangeWatchedFiles(params));
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        self.request(|reply| Event::Hover { params, reply }).await
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        self.request(|reply| Event::Definition { params, reply })
            .await
    }

    async fn document_symbol(
        &self,
        params: DocumentSymbolParams,
    ) -> Result<Option<DocumentSymbolResponse>> {
        self.request(|reply| Event::DocumentSymbols { params, reply })
            .await
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        self.request(|reply| Event::Completion { params, reply })
            .await
    }
}
