// ==============================================================================
// textDocument/completion: names available at the cursor
// ==============================================================================
//
// Runs over a snapshot elaborated in completion mode, i.e. with a marker at
// the cursor. Candidates are the document symbols (minus the one being typed
// at the marker) plus the binder variables in scope there.

use std::collections::HashSet;

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, CompletionResponse, SymbolKind};

use crate::analysis::Snapshot;
use crate::document_symbol::symbol_entries;

fn completion_kind(kind: SymbolKind) -> CompletionItemKind {
    match kind {
        SymbolKind::CLASS => CompletionItemKind::CLASS,
        SymbolKind::CONSTRUCTOR => CompletionItemKind::CONSTRUCTOR,
        SymbolKind::METHOD => CompletionItemKind::METHOD,
        SymbolKind::FUNCTION => CompletionItemKind::FUNCTION,
        SymbolKind::CONSTANT => CompletionItemKind::CONSTANT,
        _ => CompletionItemKind::TEXT,
    }
}

pub fn completion(snapshot: &Snapshot) -> CompletionResponse {
    let env = &snapshot.env;
    let marker = env
        .completion
        .as_ref()
        .map(|scope| scope.offset)
        .or(snapshot.ast.marker);

    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for var in env.completion_vars() {
        if seen.insert(var.name.to_string()) {
            items.push(CompletionItem {
                label: var.name.to_string(),
                kind: Some(CompletionItemKind::VARIABLE),
                detail: Some(var.ty.clone()),
                ..Default::default()
            });
        }
    }

    for entry in symbol_entries(env) {
        if marker.is_some_and(|offset| entry.selection.contains(offset)) {
            continue;
        }
        if seen.insert(entry.name.clone()) {
            items.push(CompletionItem {
                label: entry.name,
                kind: Some(completion_kind(entry.kind)),
                detail: entry.detail,
                ..Default::default()
            });
        }
    }

    CompletionResponse::Array(items)
}
