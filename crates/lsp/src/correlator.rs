// ==============================================================================
// Server-issued request correlation
// ==============================================================================
//
// Every request the server sends to the client gets a fresh numeric id and a
// one-shot continuation in the open request table. The continuation is
// removed before it runs, so it can fire at most once no matter what the
// client sends back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tower_lsp::jsonrpc::{self, Id};
use tower_lsp::lsp_types::request::Request;

use crate::transport::{Outbound, OutboundMessage};

type Continuation = Box<dyn FnOnce(Value) -> Result<(), serde_json::Error> + Send>;

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("response with null id")]
    NullId,

    #[error("response to unknown message {0:?}")]
    UnknownId(Id),

    #[error("{method} failed on the client: {error}")]
    Client {
        method: &'static str,
        error: jsonrpc::Error,
    },

    #[error("cannot decode {method} response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Default)]
pub struct Correlator {
    next_id: AtomicI64,
    open: Mutex<HashMap<Id, (&'static str, Continuation)>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `on_response` under a fresh id, then emit the request.
    pub fn send_request<R>(
        &self,
        outbound: &Outbound,
        params: R::Params,
        on_response: impl FnOnce(R::Result) + Send + 'static,
    ) -> Result<Id, serde_json::Error>
    where
        R: Request,
        R::Params: Serialize,
        R::Result: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let id = Id::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let continuation: Continuation = Box::new(move |value| {
            let result = serde_json::from_value::<R::Result>(value)?;
            on_response(result);
            Ok(())
        });
        self.open.lock().insert(id.clone(), (R::METHOD, continuation));
        outbound.send(OutboundMessage::Request {
            id: id.clone(),
            method: R::METHOD,
            params,
        });
        Ok(id)
    }

    /// Route a client response to its continuation. The entry is gone
    /// afterwards whatever the outcome.
    pub fn handle_response(
        &self,
        id: Id,
        result: jsonrpc::Result<Value>,
    ) -> Result<(), CorrelationError> {
        if id == Id::Null {
            return Err(CorrelationError::NullId);
        }
        let (method, continuation) = self
            .open
            .lock()
            .remove(&id)
            .ok_or(CorrelationError::UnknownId(id))?;
        let value = result.map_err(|error| CorrelationError::Client { method, error })?;
        continuation(value).map_err(|source| CorrelationError::Decode { method, source })
    }

    pub fn pending(&self) -> usize {
        self.open.lock().len()
    }
}
