// ==============================================================================
// textDocument/documentSymbol: outline of names in the file
// ==============================================================================
//
// Collects dynamic bindings, sorts and declarations from the environment into
// one flat list ordered by where each name appears. Completion reuses the
// same enumeration.

use lang_ast::{DeclKind, Span};
use lang_check::Environment;
use tower_lsp::lsp_types::{DocumentSymbol, SymbolKind};

use crate::analysis::Snapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub detail: Option<String>,
    /// The whole defining statement or form.
    pub range: Span,
    /// The defined name.
    pub selection: Span,
}

pub fn symbol_kind(kind: DeclKind) -> SymbolKind {
    match kind {
        DeclKind::Term | DeclKind::Def => SymbolKind::CONSTRUCTOR,
        DeclKind::Axiom | DeclKind::Theorem => SymbolKind::METHOD,
    }
}

/// All named entities of `env`, sorted by selection start.
pub fn symbol_entries(env: &Environment) -> Vec<SymbolEntry> {
    let bindings = env.bindings().map(|(_, binding)| SymbolEntry {
        name: binding.name.to_string(),
        kind: if binding.is_lambda {
            SymbolKind::FUNCTION
        } else {
            SymbolKind::CONSTANT
        },
        detail: Some(binding.value.clone()),
        range: binding.span,
        selection: binding.name_span,
    });
    let sorts = env.sorts().map(|(_, sort)| SymbolEntry {
        name: sort.name.to_string(),
        kind: SymbolKind::CLASS,
        detail: None,
        range: sort.span,
        selection: sort.name_span,
    });
    let decls = env.decls().map(|(_, decl)| SymbolEntry {
        name: decl.name.to_string(),
        kind: symbol_kind(decl.kind),
        detail: Some(decl.signature.clone()),
        range: decl.span,
        selection: decl.name_span,
    });

    let mut entries: Vec<_> = bindings.chain(sorts).chain(decls).collect();
    entries.sort_by_key(|entry| entry.selection.start);
    entries
}

#[allow(deprecated)] // DocumentSymbol.deprecated is deprecated but required by the struct
pub fn document_symbols(snapshot: &Snapshot) -> Vec<DocumentSymbol> {
    symbol_entries(&snapshot.env)
        .into_iter()
        .map(|entry| DocumentSymbol {
            name: entry.name,
            detail: entry.detail,
            kind: entry.kind,
            tags: None,
            deprecated: None,
            range: snapshot.line_index.range(entry.range),
            selection_range: snapshot.line_index.range(entry.selection),
            children: None,
        })
        .collect()
}
