// ==============================================================================
// Reactor: the single sequential consumer of the event queue
// ==============================================================================
//
// Every inbound notification, request and client response arrives here as an
// `Event` and is fully handled before the next one is dequeued. The open
// document texts, the correlator and the supervisor are only touched from this
// loop. Background analysis tasks share just the versioned cache and the
// outbound queue.
//
// Change notifications go through the supervisor. Queries (hover, definition,
// symbols, completion) analyze on demand and wait for the result, so their
// answers always reflect the latest text the reactor has seen.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tower_lsp::jsonrpc::{self, Id};
use tower_lsp::lsp_types::request::RegisterCapability;
use tower_lsp::lsp_types::*;

use crate::analysis::{analyze, Analysis, AnalysisError, AnalysisMode, Engine, Snapshot};
use crate::cache::{CommitOutcome, VersionedCache};
use crate::config::ServerConfig;
use crate::convert::LineIndex;
use crate::correlator::Correlator;
use crate::diagnostics::Publisher;
use crate::state::{DocumentId, Documents, OpenDocument, Version};
use crate::supervisor::{CancelOnDrop, DiagnosticsSupervisor};
use crate::transport::Outbound;
use crate::{completion, document_symbol, goto_def, hover};

pub type Responder<T> = oneshot::Sender<jsonrpc::Result<T>>;

#[derive(Debug)]
pub enum Event {
    Initialize {
        params: Box<InitializeParams>,
        reply: Responder<InitializeResult>,
    },
    Initialized,
    DidOpen(DidOpenTextDocumentParams),
    DidChange(DidChangeTextDocumentParams),
    DidClose(DidCloseTextDocumentParams),
    DidChangeConfiguration(DidChangeConfigurationParams),
    DidChangeWatchedFiles(DidChangeWatchedFilesParams),
    Cancel(CancelParams),
    Hover {
        params: HoverParams,
        reply: Responder<Option<Hover>>,
    },
    Definition {
        params: GotoDefinitionParams,
        reply: Responder<Option<GotoDefinitionResponse>>,
    },
    DocumentSymbols {
        params: DocumentSymbolParams,
        reply: Responder<Option<DocumentSymbolResponse>>,
    },
    Completion {
        params: CompletionParams,
        reply: Responder<Option<CompletionResponse>>,
    },
    /// The client's answer to a server-issued request.
    Response {
        id: Id,
        result: jsonrpc::Result<Value>,
    },
    /// Any other notification.
    Notification {
        method: String,
        params: Option<Value>,
    },
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Initialize { .. } => "initialize",
            Event::Initialized => "initialized",
            Event::DidOpen(_) => "textDocument/didOpen",
            Event::DidChange(_) => "textDocument/didChange",
            Event::DidClose(_) => "textDocument/didClose",
            Event::DidChangeConfiguration(_) => "workspace/didChangeConfiguration",
            Event::DidChangeWatchedFiles(_) => "workspace/didChangeWatchedFiles",
            Event::Cancel(_) => "$/cancelRequest",
            Event::Hover { .. } => "textDocument/hover",
            Event::Definition { .. } => "textDocument/definition",
            Event::DocumentSymbols { .. } => "textDocument/documentSymbol",
            Event::Completion { .. } => "textDocument/completion",
            Event::Response { .. } => "response",
            Event::Notification { .. } => "notification",
        }
    }
}

pub struct Reactor {
    engine: Arc<dyn Engine>,
    outbound: Outbound,
    documents: Documents,
    cache: Arc<VersionedCache>,
    publisher: Publisher,
    correlator: Correlator,
    supervisor: DiagnosticsSupervisor,
    config: ServerConfig,
    /// `--timeout-ms` from the command line; wins over the client's setting.
    timeout_override: Option<Duration>,
    dynamic_watch: bool,
}

impl Reactor {
    pub fn new(
        engine: Arc<dyn Engine>,
        outbound: Outbound,
        timeout_override: Option<Duration>,
    ) -> Self {
        let config = ServerConfig::default();
        let cache = Arc::new(VersionedCache::new());
        Reactor {
            engine,
            documents: Documents::default(),
            publisher: Publisher::new(cache.clone(), outbound.clone(), config.diagnostics.clone()),
            cache,
            correlator: Correlator::new(),
            supervisor: DiagnosticsSupervisor::new(
                outbound.clone(),
                timeout_override.unwrap_or_else(|| config.timeout()),
                config.analysis.register_initial_task,
            ),
            outbound,
            config,
            timeout_override,
            dynamic_watch: false,
        }
    }

    pub fn cache(&self) -> &Arc<VersionedCache> {
        &self.cache
    }

    /// Process events until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = rx.recv().await {
            let name = event.name();
            if let Err(panic) = AssertUnwindSafe(self.dispatch(event)).catch_unwind().await {
                let message = format!("{name} handler panicked: {}", panic_message(&*panic));
                log::error!("{message}");
                self.outbound.log_message(MessageType::ERROR, message);
            }
        }
        log::debug!("event queue closed, reactor stopping");
    }

    async fn dispatch(&mut self, event: Event) {
        match event {
            Event::Initialize { params, reply } => {
                let result = self.initialize(*params);
                let _ = reply.send(Ok(result));
            }
            Event::Initialized => self.initialized(),
            Event::DidOpen(params) => {
                let doc = params.text_document;
                let version = Some(doc.version);
                let id = DocumentId::new(&doc.uri);
                // A reopened document may restart its versions, so results
                // of any earlier session are discarded.
                let generation = self.cache.open(&id);
                self.documents.open(id.clone(), doc.text, version, generation);
                log::info!("opened {id} v{version:?} (session {generation})");
                self.reanalyze(&id);
            }
            Event::DidChange(params) => {
                let uri = params.text_document.uri;
                let version = Some(params.text_document.version);
                match self.documents.change(&uri, version, &params.content_changes) {
                    Ok((id, open)) => self.send_diagnostics(id, open),
                    Err(err) => log::warn!("ignoring change: {err}"),
                }
            }
            Event::DidClose(params) => {
                let uri = params.text_document.uri;
                match self.documents.close(&uri) {
                    Some((id, _)) => {
                        log::info!("closed {id}");
                        self.cache.close(&id);
                        self.publisher.clear(&uri);
                    }
                    None => log::debug!("close for unknown document {uri}"),
                }
            }
            Event::DidChangeConfiguration(params) => self.change_configuration(params.settings),
            Event::DidChangeWatchedFiles(params) => {
                for change in params.changes {
                    log::debug!("watched file {:?}: {}", change.typ, change.uri);
                    let id = DocumentId::new(&change.uri);
                    if change.typ == FileChangeType::DELETED
                        && self.documents.get(&id).is_none()
                        && self.cache.remove(&id)
                    {
                        log::info!("dropped cached analysis of deleted {}", change.uri);
                    }
                }
            }
            Event::Cancel(params) => log::debug!("cancel requested for {:?}", params.id),
            Event::Hover { params, reply } => {
                let position = params.text_document_position_params;
                let pos = position.position;
                let result = self
                    .query(&position.text_document.uri, "hover", |snapshot| {
                        hover::hover(snapshot, pos)
                    })
                    .await
                    .map(Option::flatten);
                let _ = reply.send(result);
            }
            Event::Definition { params, reply } => {
                let position = params.text_document_position_params;
                let uri = position.text_document.uri;
                let pos = position.position;
                let result = self
                    .query(&uri, "definition", |snapshot| {
                        goto_def::goto_definition(snapshot, pos, &uri)
                    })
                    .await
                    .map(|locations| {
                        Some(GotoDefinitionResponse::Array(locations.unwrap_or_default()))
                    });
                let _ = reply.send(result);
            }
            Event::DocumentSymbols { params, reply } => {
                let result = self
                    .query(&params.text_document.uri, "documentSymbol", |snapshot| {
                        DocumentSymbolResponse::Nested(document_symbol::document_symbols(snapshot))
                    })
                    .await;
                let _ = reply.send(result);
            }
            Event::Completion { params, reply } => {
                let result = self.completion(params).await;
                let _ = reply.send(result);
            }
            Event::Response { id, result } => {
                if let Err(err) = self.correlator.handle_response(id, result) {
                    log::error!("{err}");
                    self.outbound.log_message(MessageType::ERROR, err.to_string());
                }
            }
            Event::Notification { method, params } => {
                log::debug!("unhandled notification {method}: {params:?}")
            }
        }
    }

    // ==========================================================================
    // Lifecycle and configuration
    // ==========================================================================

    fn initialize(&mut self, params: InitializeParams) -> InitializeResult {
        self.dynamic_watch = params
            .capabilities
            .workspace
            .as_ref()
            .and_then(|ws| ws.did_change_watched_files.as_ref())
            .and_then(|caps| caps.dynamic_registration)
            .unwrap_or(false);

        if let Some(options) = params.initialization_options {
            match serde_json::from_value::<ServerConfig>(options) {
                Ok(config) => self.apply_config(config),
                Err(err) => log::warn!("ignoring invalid initializationOptions: {err}"),
            }
        }

        InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                document_symbol_provider: Some(OneOf::Left(true)),
                completion_provider: Some(CompletionOptions::default()),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "mm1-lsp".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        }
    }

    fn initialized(&mut self) {
        log::info!("mm1-lsp initialized");
        self.outbound
            .log_message(MessageType::INFO, "mm1-lsp initialized");
        if self.dynamic_watch {
            if let Err(err) = self.register_watchers() {
                log::error!("cannot register file watchers: {err}");
            }
        }
    }

    fn register_watchers(&self) -> Result<(), serde_json::Error> {
        let options = DidChangeWatchedFilesRegistrationOptions {
            watchers: vec![FileSystemWatcher {
                glob_pattern: GlobPattern::String("**/*.mm1".to_string()),
                kind: None,
            }],
        };
        let params = RegistrationParams {
            registrations: vec![Registration {
                id: "mm1-watched-files".to_string(),
                method: "workspace/didChangeWatchedFiles".to_string(),
                register_options: Some(serde_json::to_value(options)?),
            }],
        };
        self.correlator
            .send_request::<RegisterCapability>(&self.outbound, params, |()| {
                log::info!("client registered .mm1 file watchers")
            })?;
        Ok(())
    }

    fn change_configuration(&mut self, settings: Value) {
        // Clients usually nest our section under its name.
        let settings = match settings {
            Value::Object(mut map) if map.contains_key("mm1") => {
                map.remove("mm1").unwrap_or(Value::Null)
            }
            other => other,
        };
        if settings.is_null() {
            return;
        }
        match serde_json::from_value::<ServerConfig>(settings) {
            Ok(config) => {
                log::info!("configuration changed: {config:?}");
                self.apply_config(config);
                let open: Vec<_> = self.documents.iter().map(|(id, _)| id.clone()).collect();
                for id in open {
                    self.reanalyze(&id);
                }
            }
            Err(err) => log::warn!("ignoring invalid configuration: {err}"),
        }
    }

    fn apply_config(&mut self, config: ServerConfig) {
        self.supervisor
            .set_timeout(self.timeout_override.unwrap_or_else(|| config.timeout()));
        self.supervisor
            .set_register_vacant(config.analysis.register_initial_task);
        self.publisher.set_config(config.diagnostics.clone());
        self.config = config;
    }

    // ==========================================================================
    // Background analysis
    // ==========================================================================

    fn reanalyze(&self, id: &DocumentId) {
        if let Some(open) = self.documents.get(id) {
            self.send_diagnostics(id.clone(), open.clone());
        }
    }

    /// Hand a supervised parse + elaborate pass for `open` to the supervisor.
    fn send_diagnostics(&self, id: DocumentId, open: OpenDocument) {
        let OpenDocument {
            text,
            version,
            generation,
        } = open;
        let engine = self.engine.clone();
        let publisher = self.publisher.clone();
        let outbound = self.outbound.clone();
        let task_id = id.clone();

        let work = async move {
            let cancel = Arc::new(AtomicBool::new(false));
            let _guard = CancelOnDrop(cancel.clone());
            let worker_id = task_id.clone();
            let joined = tokio::task::spawn_blocking(move || {
                analyze(
                    &*engine,
                    &worker_id,
                    text,
                    version,
                    AnalysisMode::Normal,
                    &cancel,
                )
            })
            .await;
            match joined {
                Ok(Ok(analysis)) => {
                    if let CommitOutcome::Superseded { .. } =
                        publisher.commit(&task_id, generation, version, &analysis)
                    {
                        log::debug!("{task_id} v{version:?}: result superseded");
                    }
                }
                Ok(Err(cancelled)) => log::debug!("{task_id} v{version:?}: {cancelled}"),
                Err(join) => {
                    let err = AnalysisError::Engine(join.to_string());
                    log::error!("{task_id} v{version:?}: {err}");
                    outbound.log_message(MessageType::ERROR, format!("{task_id}: {err}"));
                }
            }
        };
        self.supervisor.start_or_supersede(id, version, work);
    }

    // ==========================================================================
    // Queries
    // ==========================================================================

    /// Run `analysis` synchronously from the reactor's point of view.
    async fn analyze_now(
        &self,
        id: &DocumentId,
        open: &OpenDocument,
        mode: AnalysisMode,
    ) -> Result<Analysis, AnalysisError> {
        let engine = self.engine.clone();
        let id = id.clone();
        let text = open.text.clone();
        let version = open.version;
        let analysis = tokio::task::spawn_blocking(move || {
            analyze(&*engine, &id, text, version, mode, &AtomicBool::new(false))
        })
        .await
        .map_err(|err| AnalysisError::Engine(err.to_string()))??;
        Ok(analysis)
    }

    /// A snapshot no older than the open text, reanalyzing if needed.
    async fn snapshot_for(&self, uri: &Url) -> Result<Arc<Snapshot>, AnalysisError> {
        let id = DocumentId::new(uri);
        let open = self
            .documents
            .get(&id)
            .cloned()
            .ok_or_else(|| AnalysisError::DocumentNotOpen(uri.clone()))?;
        if let Some(snapshot) = self.cache.get_fresh(&id, open.generation, open.version) {
            return Ok(snapshot);
        }

        log::debug!("{id} v{:?}: no fresh snapshot, analyzing now", open.version);
        let analysis = self.analyze_now(&id, &open, AnalysisMode::Normal).await?;
        let outcome = self
            .publisher
            .commit(&id, open.generation, open.version, &analysis);
        match (outcome, analysis.snapshot) {
            (CommitOutcome::Superseded { newer: Some(newer) }, _) => Ok(newer),
            (_, Some(snapshot)) => Ok(snapshot),
            (_, None) => Err(AnalysisError::ParseFailed {
                errors: analysis.errors,
            }),
        }
    }

    /// Answer a query against the document's snapshot. Documents that are
    /// not open or do not parse answer `None`.
    async fn query<T>(
        &self,
        uri: &Url,
        method: &str,
        run: impl FnOnce(&Snapshot) -> T,
    ) -> jsonrpc::Result<Option<T>> {
        match self.snapshot_for(uri).await {
            Ok(snapshot) => Ok(Some(run(&*snapshot))),
            Err(err @ (AnalysisError::ParseFailed { .. } | AnalysisError::DocumentNotOpen(_))) => {
                log::debug!("{method} on {uri}: {err}");
                Ok(None)
            }
            Err(err) => Err(self.handler_failed(method, uri, err)),
        }
    }

    async fn completion(
        &self,
        params: CompletionParams,
    ) -> jsonrpc::Result<Option<CompletionResponse>> {
        let position = params.text_document_position;
        let uri = position.text_document.uri;
        let id = DocumentId::new(&uri);
        let Some(open) = self.documents.get(&id).cloned() else {
            log::debug!("completion on {uri}: not open");
            return Ok(None);
        };
        let offset = LineIndex::new(open.text.clone()).offset(position.position);
        let analysis = self
            .analyze_now(&id, &open, AnalysisMode::Completion { offset })
            .await
            .map_err(|err| self.handler_failed("completion", &uri, err))?;

        // The pass parsed the text with a marker spliced in, so its
        // diagnostics are not the document's and are never published. Its
        // snapshot is kept only when the marker did not split a word.
        if analysis.cacheable {
            self.cache.commit(
                &id,
                open.generation,
                open.version,
                analysis.snapshot.clone(),
                || {},
            );
        }
        Ok(analysis.snapshot.as_deref().map(completion::completion))
    }

    fn handler_failed(&self, method: &str, uri: &Url, err: AnalysisError) -> jsonrpc::Error {
        let message = format!("{method} failed for {uri}: {err}");
        log::error!("{message}");
        self.outbound.log_message(MessageType::ERROR, message);
        jsonrpc::Error::internal_error()
    }

    #[cfg(test)]
    fn version_of(&self, id: &DocumentId) -> Option<Version> {
        self.documents.get(id).map(|open| open.version)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
