// ==============================================================================
// Property-based tests for the query handlers
// ==============================================================================
//
// Crash freedom of every position-taking handler at every offset, for both
// well-formed generated programs and token soup. Plus the line index round
// trip and the document symbol ordering guarantee.

use std::sync::atomic::AtomicBool;

use lang_ast::arbitrary::{arb_ident, arb_noise, arb_skeleton};
use proptest::prelude::*;

use crate::analysis::{analyze, AnalysisMode, Mm1Engine, Snapshot};
use crate::completion::completion;
use crate::convert::LineIndex;
use crate::document_symbol::document_symbols;
use crate::goto_def::goto_definition;
use crate::hover::hover;
use crate::state::DocumentId;
use crate::test_util::{snapshot_of, test_uri};

fn analyze_in(src: &str, mode: AnalysisMode) -> Option<std::sync::Arc<Snapshot>> {
    analyze(
        &Mm1Engine,
        &DocumentId::new(&test_uri()),
        src.into(),
        Some(1),
        mode,
        &AtomicBool::new(false),
    )
    .ok()?
    .snapshot
}

fn exercise(snapshot: &Snapshot, offset: usize) {
    let pos = snapshot.line_index.position(offset);
    let _ = hover(snapshot, pos);
    let _ = goto_definition(snapshot, pos, &test_uri());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn handlers_never_panic_on_programs(skeleton in arb_skeleton()) {
        let src = skeleton.render();
        let snapshot = snapshot_of(&src);
        let _ = document_symbols(&snapshot);
        for offset in (0..=src.len()).filter(|&i| src.is_char_boundary(i)) {
            exercise(&snapshot, offset);
            let partial = analyze_in(&src, AnalysisMode::Completion { offset });
            prop_assert!(partial.is_some());
            let _ = completion(&partial.unwrap());
        }
    }

    #[test]
    fn handlers_never_panic_on_noise(src in arb_noise(), at in 0usize..200) {
        if let Some(snapshot) = analyze_in(&src, AnalysisMode::Normal) {
            let _ = document_symbols(&snapshot);
            for offset in (0..=src.len()).filter(|&i| src.is_char_boundary(i)) {
                exercise(&snapshot, offset);
            }
        }
        let mut at = at.min(src.len());
        while !src.is_char_boundary(at) {
            at -= 1;
        }
        if let Some(partial) = analyze_in(&src, AnalysisMode::Completion { offset: at }) {
            let _ = completion(&partial);
            let _ = document_symbols(&partial);
        }
    }

    #[test]
    fn line_index_round_trips(text in "[a-z $¬𝔸\n]{0,60}") {
        let idx = LineIndex::new(text.as_str());
        for offset in (0..=text.len()).filter(|&i| text.is_char_boundary(i)) {
            let pos = idx.position(offset);
            prop_assert_eq!(idx.offset(pos), offset);
        }
    }

    #[test]
    fn document_symbols_are_sorted(
        skeleton in arb_skeleton(),
        before in prop::collection::vec(arb_ident(), 0..4),
        after in prop::collection::vec(arb_ident(), 0..4),
    ) {
        let binding = |name: &smol_str::SmolStr| format!("do {{ (def {name} (fn (x) x)) }};\n");
        let mut src: String = before.iter().map(binding).collect();
        src.push_str(&skeleton.render());
        src.push('\n');
        src.extend(after.iter().map(binding));

        let snapshot = snapshot_of(&src);
        let symbols = document_symbols(&snapshot);
        prop_assert!(symbols.len() >= before.len() + after.len() + 1);
        let starts: Vec<_> = symbols
            .iter()
            .map(|s| (s.selection_range.start.line, s.selection_range.start.character))
            .collect();
        prop_assert!(starts.windows(2).all(|w| w[0] <= w[1]), "{starts:?}");
    }
}
