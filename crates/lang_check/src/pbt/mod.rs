// ==============================================================================
// Property-Based Tests for Elaboration
// ==============================================================================
//
// Well-formed generated programs must elaborate without diagnostics and every
// declared name must be classified at its own name span. Token soup must
// never panic, in either mode, wherever the completion marker lands.

use std::sync::atomic::AtomicBool;

use lang_ast::arbitrary::{arb_noise, arb_skeleton};
use lang_ast::{parse, parse_with_marker};
use proptest::prelude::{prop_assert, prop_assert_eq, proptest, ProptestConfig};

use crate::tests::elab_str;
use crate::{elaborate, elaborate_with_completion, ElabMode, ObjectKind};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn generated_programs_are_clean(skeleton in arb_skeleton()) {
        let src = skeleton.render();
        let elab = elab_str(&src);
        prop_assert!(elab.errors.is_empty(), "{src}\n{:?}", elab.errors);

        let env = &elab.env;
        prop_assert!(env.sort_by_name(&skeleton.sort).is_some());
        for name in skeleton.terms.iter().chain(&skeleton.axioms) {
            let id = env.decl_by_name(name);
            prop_assert!(id.is_some(), "missing {name}");
            let info = env.decl(id.unwrap());
            let (span, kind) = env.spans.lookup(info.name_span.start).unwrap();
            prop_assert_eq!(span, info.name_span);
            prop_assert_eq!(kind, &ObjectKind::Decl(id.unwrap()));
        }
    }

    #[test]
    fn noise_never_panics(src in arb_noise(), at in 0usize..200) {
        let parsed = parse(&src);
        let elab = elaborate(ElabMode::Normal, &parsed.errors, &parsed.tree, &AtomicBool::new(false));
        prop_assert!(elab.is_ok());
        let elab = elab.unwrap();
        prop_assert!(elab.errors.len() >= parsed.errors.len());

        // Every classified span lies inside the source.
        for (span, _) in elab.env.spans.iter() {
            prop_assert!(span.end <= src.len());
        }

        let at = at.min(src.len());
        if src.is_char_boundary(at) {
            let parsed = parse_with_marker(&src, at);
            let elab = elaborate_with_completion(&parsed.errors, &parsed.tree, &AtomicBool::new(false));
            prop_assert!(elab.is_ok());
        }
    }

    #[test]
    fn lookup_result_contains_offset(skeleton in arb_skeleton(), at in 0usize..400) {
        let src = skeleton.render();
        let elab = elab_str(&src);
        if let Some((span, _)) = elab.env.spans.lookup(at) {
            prop_assert!(span.contains(at));
        }
    }
}
