// ==============================================================================
// Outbound message queue and pump
// ==============================================================================
//
// The reactor and background workers never talk to the tower-lsp `Client`
// directly. They push `OutboundMessage`s onto one unbounded channel, and a
// single pump task drains it in order. Server-issued requests are forwarded
// through the client on their own task, and whatever the client answers is
// fed back to the reactor as an `Event::Response` carrying our request id.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tower_lsp::jsonrpc::{self, Id};
use tower_lsp::lsp_types::request::{
    RegisterCapability, Request, ShowMessageRequest, UnregisterCapability,
    WorkDoneProgressCreate,
};
use tower_lsp::lsp_types::{Diagnostic, MessageType, Url};
use tower_lsp::Client;

use crate::reactor::Event;

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    PublishDiagnostics {
        uri: Url,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    },
    LogMessage {
        typ: MessageType,
        message: String,
    },
    /// A server-issued request. `id` is the correlator's id, not the wire id.
    Request {
        id: Id,
        method: &'static str,
        params: Value,
    },
}

/// Cloneable `send` primitive handed to everything that emits messages.
#[derive(Debug, Clone)]
pub struct Outbound(mpsc::UnboundedSender<OutboundMessage>);

impl Outbound {
    pub fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Outbound(tx)
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Outbound(tx), rx)
    }

    pub fn send(&self, msg: OutboundMessage) {
        if self.0.send(msg).is_err() {
            log::debug!("outbound channel closed, dropping message");
        }
    }

    pub fn publish_diagnostics(&self, uri: Url, diagnostics: Vec<Diagnostic>, version: Option<i32>) {
        self.send(OutboundMessage::PublishDiagnostics {
            uri,
            diagnostics,
            version,
        });
    }

    pub fn log_message(&self, typ: MessageType, message: impl Into<String>) {
        self.send(OutboundMessage::LogMessage {
            typ,
            message: message.into(),
        });
    }
}

/// Drain `rx` into the client until every sender is gone.
pub async fn pump(
    client: Client,
    mut rx: mpsc::UnboundedReceiver<OutboundMessage>,
    events: mpsc::WeakUnboundedSender<Event>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            OutboundMessage::PublishDiagnostics {
                uri,
                diagnostics,
                version,
            } => client.publish_diagnostics(uri, diagnostics, version).await,
            OutboundMessage::LogMessage { typ, message } => {
                client.log_message(typ, message).await
            }
            OutboundMessage::Request { id, method, params } => {
                let client = client.clone();
                let events = events.clone();
                tokio::spawn(async move {
                    let result = forward_request(&client, method, params).await;
                    let delivered = events
                        .upgrade()
                        .is_some_and(|tx| tx.send(Event::Response { id, result }).is_ok());
                    if !delivered {
                        log::debug!("reactor gone, dropping response to {method}");
                    }
                });
            }
        }
    }
    log::debug!("outbound pump finished");
}

async fn forward_request(client: &Client, method: &str, params: Value) -> jsonrpc::Result<Value> {
    if method == RegisterCapability::METHOD {
        forward::<RegisterCapability>(client, params).await
    } else if method == UnregisterCapability::METHOD {
        forward::<UnregisterCapability>(client, params).await
    } else if method == ShowMessageRequest::METHOD {
        forward::<ShowMessageRequest>(client, params).await
    } else if method == WorkDoneProgressCreate::METHOD {
        forward::<WorkDoneProgressCreate>(client, params).await
    } else {
        log::warn!("no client forwarding for server request {method}");
        Err(jsonrpc::Error::method_not_found())
    }
}

async fn forward<R>(client: &Client, params: Value) -> jsonrpc::Result<Value>
where
    R: Request,
    R::Params: DeserializeOwned,
    R::Result: Serialize,
{
    let params: R::Params = serde_json::from_value(params)
        .map_err(|err| jsonrpc::Error::invalid_params(err.to_string()))?;
    let result = client.send_request::<R>(params).await?;
    serde_json::to_value(result).map_err(|_| jsonrpc::Error::internal_error())
}
