// ==============================================================================
// Semantic environment
// ==============================================================================
//
// Three independent namespaces: sorts, declarations (term/axiom/def/theorem)
// and dynamic bindings created by `(def NAME VALUE)` in do-blocks. Each entity
// remembers both its name span (the selection) and the span of the whole
// statement or form that introduced it.

use la_arena::{Arena, Idx};
use lang_ast::{DeclKind, Span};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

pub type SortId = Idx<SortInfo>;
pub type DeclId = Idx<DeclInfo>;
pub type BindingId = Idx<Binding>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortInfo {
    pub name: SmolStr,
    pub name_span: Span,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarInfo {
    pub name: SmolStr,
    pub span: Span,
    /// Rendered type, e.g. `wff` or `$ a -> b $`.
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclInfo {
    pub kind: DeclKind,
    pub name: SmolStr,
    pub name_span: Span,
    pub span: Span,
    pub vars: Vec<VarInfo>,
    pub ret: String,
    pub value: Option<String>,
    /// `kind name (binders): ret`, as shown on hover.
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub name: SmolStr,
    pub name_span: Span,
    pub span: Span,
    pub value: String,
    pub is_lambda: bool,
}

/// What a classified span refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    Sort(SortId),
    Decl(DeclId),
    /// The `index`-th binder variable of `decl`.
    Var { decl: DeclId, index: usize },
    /// A do-block atom: a dynamic binding or a builtin.
    Atom(SmolStr),
}

/// Classified spans, sorted by start offset once elaboration finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanIndex {
    entries: Vec<(Span, ObjectKind)>,
}

impl SpanIndex {
    pub(crate) fn push(&mut self, span: Span, kind: ObjectKind) {
        self.entries.push((span, kind));
    }

    pub(crate) fn finish(&mut self) {
        self.entries.sort_by_key(|(span, _)| (span.start, span.end));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Span, ObjectKind)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The smallest span containing `offset`. A span starting at or running
    /// over `offset` wins against one that merely ends there.
    pub fn lookup(&self, offset: usize) -> Option<(Span, &ObjectKind)> {
        let upto = self.entries.partition_point(|(span, _)| span.start <= offset);
        self.entries[..upto]
            .iter()
            .filter(|(span, _)| span.contains(offset))
            .min_by_key(|(span, _)| (span.end == offset && !span.is_empty(), span.len()))
            .map(|(span, kind)| (*span, kind))
    }
}

/// The binder variables visible at the completion marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionScope {
    pub offset: usize,
    pub decl: Option<DeclId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    sorts: Arena<SortInfo>,
    decls: Arena<DeclInfo>,
    bindings: Arena<Binding>,
    sort_names: FxHashMap<SmolStr, SortId>,
    decl_names: FxHashMap<SmolStr, DeclId>,
    binding_names: FxHashMap<SmolStr, BindingId>,
    pub spans: SpanIndex,
    pub completion: Option<CompletionScope>,
}

impl Environment {
    // ==========================================================================
    // Construction (elaborator only)
    // ==========================================================================

    /// Adds a sort. The name map keeps pointing at the first definition when
    /// the name is a duplicate.
    pub(crate) fn add_sort(&mut self, info: SortInfo) -> SortId {
        let name = info.name.clone();
        let id = self.sorts.alloc(info);
        self.sort_names.entry(name).or_insert(id);
        id
    }

    pub(crate) fn add_decl(&mut self, info: DeclInfo) -> DeclId {
        let name = info.name.clone();
        let id = self.decls.alloc(info);
        self.decl_names.entry(name).or_insert(id);
        id
    }

    pub(crate) fn decl_mut(&mut self, id: DeclId) -> &mut DeclInfo {
        &mut self.decls[id]
    }

    /// Adds a dynamic binding. Later bindings shadow earlier ones.
    pub(crate) fn add_binding(&mut self, binding: Binding) -> BindingId {
        let name = binding.name.clone();
        let id = self.bindings.alloc(binding);
        self.binding_names.insert(name, id);
        id
    }

    // ==========================================================================
    // Queries
    // ==========================================================================

    pub fn sorts(&self) -> impl Iterator<Item = (SortId, &SortInfo)> {
        self.sorts.iter()
    }

    pub fn decls(&self) -> impl Iterator<Item = (DeclId, &DeclInfo)> {
        self.decls.iter()
    }

    pub fn bindings(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.bindings.iter()
    }

    pub fn sort(&self, id: SortId) -> &SortInfo {
        &self.sorts[id]
    }

    pub fn decl(&self, id: DeclId) -> &DeclInfo {
        &self.decls[id]
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id]
    }

    pub fn sort_by_name(&self, name: &str) -> Option<SortId> {
        self.sort_names.get(name).copied()
    }

    pub fn decl_by_name(&self, name: &str) -> Option<DeclId> {
        self.decl_names.get(name).copied()
    }

    /// The binding currently visible under `name`, i.e. the last one.
    pub fn binding_by_name(&self, name: &str) -> Option<BindingId> {
        self.binding_names.get(name).copied()
    }

    pub fn var(&self, decl: DeclId, index: usize) -> Option<&VarInfo> {
        self.decls[decl].vars.get(index)
    }

    /// Variables in scope at the completion marker, if any.
    pub fn completion_vars(&self) -> &[VarInfo] {
        match self.completion.as_ref().and_then(|c| c.decl) {
            Some(decl) => &self.decls[decl].vars,
            None => &[],
        }
    }
}
