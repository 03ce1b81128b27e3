// ==============================================================================
// textDocument/definition: jump to where a name is defined
// ==============================================================================
//
// Uses the same span classification as hover, then maps the classified
// entity back to its defining site: the sort or declaration name, the binder
// variable, or the name of a `(def NAME ...)` dynamic binding. Builtin atoms
// have no site in the file.

use lang_check::ObjectKind;
use tower_lsp::lsp_types::{Location, Position, Url};

use crate::analysis::Snapshot;

/// Definition sites for the entity at `pos`. Empty when nothing resolves.
pub fn goto_definition(snapshot: &Snapshot, pos: Position, uri: &Url) -> Vec<Location> {
    let offset = snapshot.line_index.offset(pos);
    let Some((_, kind)) = snapshot.env.spans.lookup(offset) else {
        return Vec::new();
    };
    let env = &snapshot.env;

    let target = match kind {
        ObjectKind::Sort(id) => Some(env.sort(*id).name_span),
        ObjectKind::Decl(id) => Some(env.decl(*id).name_span),
        ObjectKind::Var { decl, index } => env.var(*decl, *index).map(|var| var.span),
        ObjectKind::Atom(name) => env
            .binding_by_name(name)
            .map(|id| env.binding(id).name_span),
    };

    target
        .map(|span| Location::new(uri.clone(), snapshot.line_index.range(span)))
        .into_iter()
        .collect()
}
