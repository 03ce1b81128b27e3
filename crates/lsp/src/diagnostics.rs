// ==============================================================================
// ElabError -> LSP Diagnostic conversion and publication
// ==============================================================================

use std::sync::Arc;

use lang_check::{ElabError, ElabLevel};
use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, Location, Url,
};

use crate::analysis::Analysis;
use crate::cache::{CommitOutcome, VersionedCache};
use crate::config::DiagnosticsConfig;
use crate::convert::LineIndex;
use crate::state::{DocumentId, Generation, Version};
use crate::transport::Outbound;

/// Default cap on diagnostics per publication.
pub const MAX_DIAGNOSTICS: usize = 100;

const SOURCE: &str = "mm1";

/// Convert engine errors into at most `max` LSP diagnostics, in input order.
pub fn to_lsp_diagnostics(
    errors: &[ElabError],
    line_index: &LineIndex,
    uri: &Url,
    max: usize,
) -> Vec<Diagnostic> {
    errors
        .iter()
        .take(max)
        .map(|err| {
            let severity = match err.level {
                ElabLevel::Error => DiagnosticSeverity::ERROR,
                ElabLevel::Warning => DiagnosticSeverity::WARNING,
                ElabLevel::Info => DiagnosticSeverity::INFORMATION,
            };
            let related: Vec<_> = err
                .related
                .iter()
                .map(|(span, message)| DiagnosticRelatedInformation {
                    location: Location::new(uri.clone(), line_index.range(*span)),
                    message: message.clone(),
                })
                .collect();

            Diagnostic {
                range: line_index.range(err.span),
                severity: Some(severity),
                source: Some(SOURCE.to_string()),
                message: err.message.clone(),
                related_information: (!related.is_empty()).then_some(related),
                ..Default::default()
            }
        })
        .collect()
}

/// Writes analysis results to the cache and publishes their diagnostics,
/// both under the cache's write rule.
#[derive(Debug, Clone)]
pub struct Publisher {
    cache: Arc<VersionedCache>,
    outbound: Outbound,
    config: DiagnosticsConfig,
}

impl Publisher {
    pub fn new(cache: Arc<VersionedCache>, outbound: Outbound, config: DiagnosticsConfig) -> Self {
        Publisher {
            cache,
            outbound,
            config,
        }
    }

    pub fn set_config(&mut self, config: DiagnosticsConfig) {
        self.config = config;
    }

    /// Commit a normal pass over `doc`: store its snapshot and publish its
    /// diagnostics, unless the version is stale or the session is over.
    pub fn commit(
        &self,
        doc: &DocumentId,
        generation: Generation,
        version: Version,
        analysis: &Analysis,
    ) -> CommitOutcome {
        let snapshot = analysis.snapshot.clone();
        self.cache.commit(doc, generation, version, snapshot, || {
            if !self.config.enable {
                return;
            }
            let diagnostics = to_lsp_diagnostics(
                &analysis.errors,
                &analysis.line_index,
                doc.uri(),
                self.config.max_count,
            );
            log::debug!("{doc} v{version:?}: publishing {} diagnostic(s)", diagnostics.len());
            self.outbound
                .publish_diagnostics(doc.uri().clone(), diagnostics, version);
        })
    }

    /// Clear the published diagnostics of `uri`.
    pub fn clear(&self, uri: &Url) {
        self.outbound.publish_diagnostics(uri.clone(), Vec::new(), None);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use lang_ast::Span;
    use tower_lsp::lsp_types::Position;

    use super::*;
    use crate::analysis::{analyze, AnalysisMode, Mm1Engine};
    use crate::transport::OutboundMessage;

    fn uri() -> Url {
        Url::parse("file:///test/diag.mm1").unwrap()
    }

    #[test]
    fn severity_range_and_related() {
        let text = "sort wff;\nsort wff;\n";
        let idx = LineIndex::new(text);
        let err = ElabError::new(ElabLevel::Error, Span::new(15, 18), "duplicate sort `wff`")
            .with_related(Span::new(5, 8), "first declared here");
        let warning = ElabError::new(ElabLevel::Warning, Span::new(0, 4), "w");
        let info = ElabError::new(ElabLevel::Info, Span::new(0, 4), "i");

        let diags = to_lsp_diagnostics(&[err, warning, info], &idx, &uri(), MAX_DIAGNOSTICS);
        assert_eq!(diags.len(), 3);
        assert_eq!(diags[0].severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(diags[0].range.start, Position::new(1, 5));
        assert_eq!(diags[0].source.as_deref(), Some("mm1"));
        let related = diags[0].related_information.as_ref().unwrap();
        assert_eq!(related[0].location.range.start, Position::new(0, 5));
        assert_eq!(related[0].message, "first declared here");
        assert_eq!(diags[1].severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(diags[2].severity, Some(DiagnosticSeverity::INFORMATION));
        assert!(diags[1].related_information.is_none());
    }

    #[test]
    fn capped_at_max() {
        let idx = LineIndex::new("x");
        let errors: Vec<_> = (0..150)
            .map(|i| ElabError::new(ElabLevel::Error, Span::new(0, 1), format!("e{i}")))
            .collect();
        let diags = to_lsp_diagnostics(&errors, &idx, &uri(), MAX_DIAGNOSTICS);
        assert_eq!(diags.len(), 100);
        assert_eq!(diags[99].message, "e99");
    }

    #[test]
    fn stale_commit_does_not_publish() {
        let (outbound, mut rx) = Outbound::channel();
        let cache = Arc::new(VersionedCache::new());
        let publisher = Publisher::new(cache.clone(), outbound, DiagnosticsConfig::default());
        let doc = DocumentId::new(&uri());
        let g = cache.open(&doc);
        let pass = |version| {
            analyze(
                &Mm1Engine,
                &doc,
                "sort wff;".into(),
                version,
                AnalysisMode::Normal,
                &AtomicBool::new(false),
            )
            .unwrap()
        };

        publisher.commit(&doc, g, Some(2), &pass(Some(2)));
        publisher.commit(&doc, g, Some(1), &pass(Some(1)));

        match rx.try_recv().unwrap() {
            OutboundMessage::PublishDiagnostics { version, .. } => assert_eq!(version, Some(2)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disabled_diagnostics_still_cache() {
        let (outbound, mut rx) = Outbound::channel();
        let cache = Arc::new(VersionedCache::new());
        let publisher = Publisher::new(
            cache.clone(),
            outbound,
            DiagnosticsConfig {
                enable: false,
                max_count: MAX_DIAGNOSTICS,
            },
        );
        let doc = DocumentId::new(&uri());
        let g = cache.open(&doc);
        let analysis = analyze(
            &Mm1Engine,
            &doc,
            "sort wff;".into(),
            Some(1),
            AnalysisMode::Normal,
            &AtomicBool::new(false),
        )
        .unwrap();
        assert!(matches!(
            publisher.commit(&doc, g, Some(1), &analysis),
            CommitOutcome::Applied
        ));
        assert!(rx.try_recv().is_err());
        assert!(cache.get(&doc).is_some());
    }
}
