// ==============================================================================
// ElabError -> miette report
// ==============================================================================

use std::fmt;
use std::sync::atomic::AtomicBool;

use lang_check::{Cancelled, ElabError, ElabLevel, ElabMode};
use miette::{Diagnostic, LabeledSpan, NamedSource, Severity, SourceCode, SourceSpan};
use thiserror::Error;

/// One engine diagnostic, carrying its own copy of the source for rendering.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ElabReport {
    message: String,
    severity: Severity,
    src: NamedSource<String>,
    span: SourceSpan,
    related: Vec<(SourceSpan, String)>,
}

impl ElabReport {
    pub fn new(name: &str, text: &str, err: &ElabError) -> Self {
        let severity = match err.level {
            ElabLevel::Error => Severity::Error,
            ElabLevel::Warning => Severity::Warning,
            ElabLevel::Info => Severity::Advice,
        };
        ElabReport {
            message: err.message.clone(),
            severity,
            src: NamedSource::new(name, text.to_string()),
            span: source_span(err.span),
            related: err
                .related
                .iter()
                .map(|(span, message)| (source_span(*span), message.clone()))
                .collect(),
        }
    }
}

fn source_span(span: lang_ast::Span) -> SourceSpan {
    (span.start, span.end.saturating_sub(span.start)).into()
}

impl Diagnostic for ElabReport {
    fn severity(&self) -> Option<Severity> {
        Some(self.severity)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.src)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let primary = LabeledSpan::new_with_span(None, self.span);
        let related = self
            .related
            .iter()
            .map(|(span, message)| LabeledSpan::new_with_span(Some(message.clone()), *span));
        Some(Box::new(std::iter::once(primary).chain(related)))
    }
}

/// Tally of one checked file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
}

impl Summary {
    pub fn add(&mut self, other: Summary) {
        self.errors += other.errors;
        self.warnings += other.warnings;
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s), {} warning(s)", self.errors, self.warnings)
    }
}

/// Parse and elaborate `text`, returning one report per engine diagnostic.
pub fn check_source(name: &str, text: &str) -> Result<Vec<ElabReport>, Cancelled> {
    let parsed = lang_ast::parse(text);
    let elaborated = lang_check::elaborate(
        ElabMode::Normal,
        &parsed.errors,
        &parsed.tree,
        &AtomicBool::new(false),
    )?;
    Ok(elaborated
        .errors
        .iter()
        .map(|err| ElabReport::new(name, text, err))
        .collect())
}

pub fn summarize(reports: &[ElabReport]) -> Summary {
    reports.iter().fold(Summary::default(), |mut acc, report| {
        match report.severity {
            Severity::Error => acc.errors += 1,
            Severity::Warning => acc.warnings += 1,
            Severity::Advice => {}
        }
        acc
    })
}
