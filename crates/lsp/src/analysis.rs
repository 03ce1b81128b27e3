// ==============================================================================
// Engine boundary and the parse + elaborate pass
// ==============================================================================
//
// `Engine` is the seam to the language front end. `analyze` runs one pass for
// one document version and packages the result as an immutable `Snapshot`.
// It is a plain blocking function; callers decide whether it runs on a
// background worker (supervisor) or on behalf of a waiting query (reactor).

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use lang_ast::{Ast, ParseError, Parsed};
use lang_check::{Cancelled, ElabError, ElabMode, Elaborated, Environment};
use thiserror::Error;
use tower_lsp::lsp_types::Url;

use crate::convert::LineIndex;
use crate::state::{DocumentId, Version};

pub trait Engine: Send + Sync + 'static {
    /// Parse `text`, optionally with a zero-width completion marker.
    fn parse(&self, doc: &DocumentId, text: &str, marker: Option<usize>) -> Parsed;

    fn elaborate(
        &self,
        mode: ElabMode,
        parse_errors: &[ParseError],
        ast: &Ast,
        cancel: &AtomicBool,
    ) -> Result<Elaborated, Cancelled>;
}

/// The .mm1 front end.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mm1Engine;

impl Engine for Mm1Engine {
    fn parse(&self, doc: &DocumentId, text: &str, marker: Option<usize>) -> Parsed {
        log::trace!("parsing {doc} ({} bytes)", text.len());
        match marker {
            Some(offset) => lang_ast::parse_with_marker(text, offset),
            None => lang_ast::parse(text),
        }
    }

    fn elaborate(
        &self,
        mode: ElabMode,
        parse_errors: &[ParseError],
        ast: &Ast,
        cancel: &AtomicBool,
    ) -> Result<Elaborated, Cancelled> {
        lang_check::elaborate(mode, parse_errors, ast, cancel)
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("parse failed with {} error(s)", errors.len())]
    ParseFailed { errors: Vec<ElabError> },

    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("analysis engine failed: {0}")]
    Engine(String),

    #[error("document is not open: {0}")]
    DocumentNotOpen(Url),
}

/// Immutable result of one successful analysis pass.
#[derive(Debug)]
pub struct Snapshot {
    pub version: Version,
    pub line_index: LineIndex,
    pub ast: Ast,
    pub env: Environment,
}

impl Snapshot {
    pub fn text(&self) -> &str {
        self.line_index.text()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    Normal,
    /// Reparse with a marker at `offset` and elaborate leniently around it.
    Completion { offset: usize },
}

#[derive(Debug)]
pub struct Analysis {
    pub version: Version,
    /// Every diagnostic of the pass, parse errors first.
    pub errors: Vec<ElabError>,
    pub line_index: LineIndex,
    /// Absent when a normal pass hit parse errors.
    pub snapshot: Option<Arc<Snapshot>>,
    /// Whether the snapshot reflects the text as written and may be cached.
    pub cacheable: bool,
}

/// Run one parse + elaborate pass.
pub fn analyze(
    engine: &dyn Engine,
    doc: &DocumentId,
    text: Arc<str>,
    version: Version,
    mode: AnalysisMode,
    cancel: &AtomicBool,
) -> Result<Analysis, Cancelled> {
    let line_index = LineIndex::new(text.clone());
    match mode {
        AnalysisMode::Normal => {
            let parsed = engine.parse(doc, &text, None);
            if !parsed.errors.is_empty() {
                log::debug!("{doc} v{version:?}: {} parse error(s)", parsed.errors.len());
                return Ok(Analysis {
                    version,
                    errors: parsed.errors.iter().map(ElabError::from).collect(),
                    line_index,
                    snapshot: None,
                    cacheable: false,
                });
            }
            let elaborated = engine.elaborate(ElabMode::Normal, &[], &parsed.tree, cancel)?;
            Ok(finish(version, line_index, parsed.tree, elaborated, true))
        }
        AnalysisMode::Completion { offset } => {
            let parsed = engine.parse(doc, &text, Some(offset));
            let elaborated =
                engine.elaborate(ElabMode::Completion, &parsed.errors, &parsed.tree, cancel)?;
            let cacheable = parsed.errors.is_empty() && !splits_word(&text, offset);
            Ok(finish(version, line_index, parsed.tree, elaborated, cacheable))
        }
    }
}

fn finish(
    version: Version,
    line_index: LineIndex,
    ast: Ast,
    elaborated: Elaborated,
    cacheable: bool,
) -> Analysis {
    let Elaborated { errors, env } = elaborated;
    Analysis {
        version,
        errors,
        line_index: line_index.clone(),
        snapshot: Some(Arc::new(Snapshot {
            version,
            line_index,
            ast,
            env,
        })),
        cacheable,
    }
}

/// A marker strictly inside an identifier changes how the text tokenizes.
fn splits_word(text: &str, offset: usize) -> bool {
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'\'';
    let bytes = text.as_bytes();
    offset > 0
        && offset < bytes.len()
        && is_word(bytes[offset - 1])
        && is_word(bytes[offset])
}
