// ==============================================================================
// Builtin do-block atoms
// ==============================================================================

/// Names the do-block evaluator knows without a `def`.
const BUILTIN_ATOMS: &[&str] = &[
    // Special forms
    "def",
    "fn",
    "lambda",
    "let",
    "letrec",
    "if",
    "begin",
    "quote",
    "match",
    "focus",
    // Arithmetic and comparison
    "+",
    "-",
    "*",
    "//",
    "%",
    "=",
    "<",
    ">",
    "<=",
    ">=",
    "min",
    "max",
    // Logic
    "and",
    "or",
    "not",
    // Lists
    "list",
    "cons",
    "head",
    "tail",
    "nth",
    "map",
    // IO and misc
    "display",
    "print",
    "error",
    "refine",
    "have",
    "stat",
];

/// Special forms whose second element is a parameter list scoped over the
/// remaining elements.
pub(crate) const LAMBDA_FORMS: &[&str] = &["fn", "lambda"];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_ATOMS.contains(&name)
}

pub fn builtins() -> impl Iterator<Item = &'static str> {
    BUILTIN_ATOMS.iter().copied()
}
