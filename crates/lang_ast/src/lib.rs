// ==============================================================================
// lang_ast: spans, tokens and the recovering parser for .mm1 sources
// ==============================================================================
//
// The parser never gives up on a file. Every malformed statement yields one
// ParseError and parsing resumes after the next `;`, so callers always get a
// partial tree. The tree only counts as a usable AST when no errors were
// reported (see `Parsed::ast`).

#[cfg(feature = "proptest_support")]
pub mod arbitrary;
mod lexer;
mod parser;


use std::fmt;
use std::ops::Range;

use derive_more::Display;
use la_arena::{Arena, Idx};
use smol_str::SmolStr;
use thiserror::Error;

pub use lexer::{Keyword, Lexer, Token, TokenKind};
pub use parser::{parse, parse_with_marker};

/// A half-open byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Offsets touching either edge count as inside, so a cursor placed right
    /// after an identifier still resolves to it.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn cover(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }
}

impl From<Range<usize>> for Span {
    fn from(r: Range<usize>) -> Self {
        Span::new(r.start, r.end)
    }
}

impl From<Span> for Range<usize> {
    fn from(s: Span) -> Self {
        s.start..s.end
    }
}

// ==============================================================================
// Syntax tree
// ==============================================================================

pub type StmtId = Idx<Stmt>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: SmolStr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DeclKind {
    #[display("term")]
    Term,
    #[display("axiom")]
    Axiom,
    #[display("def")]
    Def,
    #[display("theorem")]
    Theorem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Sort { name: Ident },
    Decl(Decl),
    Do { forms: Vec<SExpr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decl {
    pub kind: DeclKind,
    pub name: Ident,
    pub binders: Vec<Binder>,
    pub ret: Type,
    pub value: Option<Formula>,
}

/// `(a b: wff)` or `(h: $ a $)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binder {
    pub span: Span,
    pub vars: Vec<Ident>,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Sort(Ident),
    Formula(Formula),
}

impl Type {
    pub fn span(&self) -> Span {
        match self {
            Type::Sort(ident) => ident.span,
            Type::Formula(f) => f.span,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Sort(ident) => write!(f, "{}", ident.name),
            Type::Formula(formula) => write!(f, "{formula}"),
        }
    }
}

/// The contents of a `$ ... $` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    pub span: Span,
    pub tokens: Vec<MathToken>,
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for tok in &self.tokens {
            write!(f, " {}", tok.text())?;
        }
        write!(f, " $")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathToken {
    Ident(Ident),
    Symbol { text: SmolStr, span: Span },
}

impl MathToken {
    pub fn text(&self) -> &str {
        match self {
            MathToken::Ident(ident) => &ident.name,
            MathToken::Symbol { text, .. } => text,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            MathToken::Ident(ident) => ident.span,
            MathToken::Symbol { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SExpr {
    pub span: Span,
    pub kind: SExprKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SExprKind {
    Atom(SmolStr),
    Number(SmolStr),
    List(Vec<SExpr>),
}

impl SExpr {
    pub fn as_atom(&self) -> Option<&SmolStr> {
        match &self.kind {
            SExprKind::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SExpr]> {
        match &self.kind {
            SExprKind::List(es) => Some(es),
            _ => None,
        }
    }
}

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SExprKind::Atom(a) | SExprKind::Number(a) => write!(f, "{a}"),
            SExprKind::List(es) => {
                write!(f, "(")?;
                for (i, e) in es.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{e}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A parsed file: statements in source order plus a position index over them.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    pub stmts: Arena<Stmt>,
    /// Statement ids sorted by start offset, for `stmt_at`.
    order: Vec<StmtId>,
    /// Offset of the synthetic completion marker, when the file was parsed
    /// with one.
    pub marker: Option<usize>,
}

impl Ast {
    fn push(&mut self, stmt: Stmt) -> StmtId {
        let id = self.stmts.alloc(stmt);
        self.order.push(id);
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = (StmtId, &Stmt)> + '_ {
        self.order.iter().map(|&id| (id, &self.stmts[id]))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The statement whose span contains `offset`, found by binary search.
    pub fn stmt_at(&self, offset: usize) -> Option<StmtId> {
        let idx = self
            .order
            .partition_point(|&id| self.stmts[id].span.start <= offset);
        let id = *self.order.get(idx.checked_sub(1)?)?;
        self.stmts[id].span.contains(offset).then_some(id)
    }
}

impl std::ops::Index<StmtId> for Ast {
    type Output = Stmt;

    fn index(&self, id: StmtId) -> &Stmt {
        &self.stmts[id]
    }
}

// ==============================================================================
// Errors
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("expected a statement keyword, found {0}")]
    ExpectedStatement(SmolStr),

    #[error("expected {expected}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: SmolStr,
    },

    #[error("unterminated formula: missing closing `$`")]
    UnterminatedFormula,

    #[error("unclosed `{0}`")]
    Unclosed(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub span: Span,
    pub kind: ParseErrorKind,
}

/// Parser output. `tree` holds every statement that parsed, even when some
/// did not.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    pub errors: Vec<ParseError>,
    pub tree: Ast,
}

impl Parsed {
    /// The syntax tree, only when the whole file parsed without errors.
    pub fn ast(&self) -> Option<&Ast> {
        self.errors.is_empty().then_some(&self.tree)
    }
}
