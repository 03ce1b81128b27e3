// ==============================================================================
// lang_check: elaboration of parsed .mm1 files
// ==============================================================================
//
// Walks the statements of an Ast in order, building the Environment (sorts,
// declarations, dynamic bindings) and the classified SpanIndex that hover and
// go-to-definition resolve against. Elaboration errors never abort the pass;
// they ride alongside whatever environment could be built.

mod builtins;
mod elab;
pub mod env;


#[cfg(test)]
mod pbt;

use std::sync::atomic::AtomicBool;

use derive_more::Display;
use lang_ast::{Ast, ParseError, Span};
use thiserror::Error;

pub use builtins::{builtins, is_builtin};
pub use env::{
    Binding, BindingId, CompletionScope, DeclId, DeclInfo, Environment, ObjectKind, SortId,
    SortInfo, SpanIndex, VarInfo,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum ElabLevel {
    #[display("error")]
    Error,
    #[display("warning")]
    Warning,
    #[display("info")]
    Info,
}

/// A diagnostic produced by the parser or the elaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElabError {
    pub level: ElabLevel,
    pub span: Span,
    pub message: String,
    /// Secondary locations, e.g. the earlier declaration of a duplicate.
    pub related: Vec<(Span, String)>,
}

impl ElabError {
    pub fn new(level: ElabLevel, span: Span, message: impl Into<String>) -> Self {
        ElabError {
            level,
            span,
            message: message.into(),
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, span: Span, message: impl Into<String>) -> Self {
        self.related.push((span, message.into()));
        self
    }
}

impl From<&ParseError> for ElabError {
    fn from(err: &ParseError) -> Self {
        ElabError::new(ElabLevel::Error, err.span, err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("elaboration cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElabMode {
    #[default]
    Normal,
    /// Identifiers touching the Ast's marker are incomplete, not unknown, and
    /// the variables in scope at the marker are recorded.
    Completion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Elaborated {
    /// Parse errors first, then elaboration errors in source order.
    pub errors: Vec<ElabError>,
    pub env: Environment,
}

impl Elaborated {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(|e| e.level == ElabLevel::Error)
    }
}

/// Elaborate `ast`. `cancel` is polled between statements; once it reads
/// true the pass stops with `Cancelled`.
pub fn elaborate(
    mode: ElabMode,
    parse_errors: &[ParseError],
    ast: &Ast,
    cancel: &AtomicBool,
) -> Result<Elaborated, Cancelled> {
    let marker = match mode {
        ElabMode::Normal => None,
        ElabMode::Completion => ast.marker,
    };
    let mut elaborated = elab::ElabCtx::new(marker).run(ast, cancel)?;
    let mut errors: Vec<ElabError> = parse_errors.iter().map(ElabError::from).collect();
    errors.append(&mut elaborated.errors);
    elaborated.errors = errors;
    Ok(elaborated)
}

pub fn elaborate_with_completion(
    parse_errors: &[ParseError],
    ast: &Ast,
    cancel: &AtomicBool,
) -> Result<Elaborated, Cancelled> {
    elaborate(ElabMode::Completion, parse_errors, ast, cancel)
}
