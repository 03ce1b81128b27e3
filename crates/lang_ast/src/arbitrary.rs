// ==============================================================================
// Proptest generators for .mm1 sources
// ==============================================================================
//
// `arb_program` produces well-formed files where every name is declared before
// use, so they parse and elaborate cleanly. `arb_noise` produces arbitrary
// token soup for crash-freedom tests.

use proptest::prelude::{prop, prop_oneof, BoxedStrategy, Just, Strategy};
use smol_str::SmolStr;

const KEYWORDS: &[&str] = &["sort", "term", "axiom", "def", "theorem", "do"];

pub fn arb_ident() -> impl Strategy<Value = SmolStr> {
    "[a-z][a-z0-9_]{0,6}"
        .prop_filter("keywords are not identifiers", |s| {
            !KEYWORDS.contains(&s.as_str())
        })
        .prop_map(SmolStr::from)
}

/// A sort name plus a few term constructors over it.
#[derive(Debug, Clone)]
pub struct ProgramSkeleton {
    pub sort: SmolStr,
    pub terms: Vec<SmolStr>,
    pub axioms: Vec<SmolStr>,
}

impl ProgramSkeleton {
    pub fn render(&self) -> String {
        let mut out = format!("sort {};\n", self.sort);
        for t in &self.terms {
            out.push_str(&format!("term {t} (a b: {s}): {s};\n", s = self.sort));
        }
        for (i, ax) in self.axioms.iter().enumerate() {
            let body = match self.terms.get(i % self.terms.len().max(1)) {
                Some(t) => format!("$ {t} a b $"),
                None => "$ a $".to_string(),
            };
            out.push_str(&format!("axiom {ax} (a b: {}): {body};\n", self.sort));
        }
        out
    }

    /// Every declared name, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &SmolStr> {
        std::iter::once(&self.sort)
            .chain(&self.terms)
            .chain(&self.axioms)
    }
}

pub fn arb_skeleton() -> impl Strategy<Value = ProgramSkeleton> {
    prop::collection::btree_set(arb_ident(), 1..8)
        .prop_filter("binder names are reserved", |names| {
            !names.contains("a") && !names.contains("b")
        })
        .prop_flat_map(|names| {
            let names: Vec<SmolStr> = names.into_iter().collect();
            let n = names.len();
            (Just(names), 0..n)
        })
        .prop_map(|(names, split)| {
            let mut rest = names.into_iter();
            let sort = rest.next().unwrap_or_else(|| SmolStr::new("s"));
            let rest: Vec<SmolStr> = rest.collect();
            let split = split.min(rest.len());
            ProgramSkeleton {
                sort,
                terms: rest[..split].to_vec(),
                axioms: rest[split..].to_vec(),
            }
        })
}

pub fn arb_program() -> impl Strategy<Value = String> {
    arb_skeleton().prop_map(|s| s.render())
}

fn arb_token() -> BoxedStrategy<String> {
    prop_oneof![
        arb_ident().prop_map(|s| s.to_string()),
        prop::sample::select(KEYWORDS).prop_map(str::to_string),
        prop::sample::select(&["$", "(", ")", "{", "}", ":", ";", "=", "->", "¬", "--", "\n", "42"][..])
            .prop_map(str::to_string),
    ]
    .boxed()
}

/// Arbitrary token soup. Mostly garbage, occasionally valid.
pub fn arb_noise() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_token(), 0..40).prop_map(|toks| toks.join(" "))
}
