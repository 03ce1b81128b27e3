// ==============================================================================
// textDocument/hover: describe the entity under the cursor
// ==============================================================================
//
// Converts the cursor position to a byte offset, finds the smallest classified
// span containing it, and renders a short description of what that span
// denotes from the snapshot's environment.

use lang_check::ObjectKind;
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use crate::analysis::Snapshot;

/// Try to produce hover information for the given cursor position.
pub fn hover(snapshot: &Snapshot, pos: Position) -> Option<Hover> {
    let offset = snapshot.line_index.offset(pos);
    let (span, kind) = snapshot.env.spans.lookup(offset)?;
    let env = &snapshot.env;

    let markdown = match kind {
        ObjectKind::Sort(id) => code_block(&format!("sort {}", env.sort(*id).name)),
        ObjectKind::Decl(id) => {
            let decl = env.decl(*id);
            match &decl.value {
                Some(value) => code_block(&format!("{} = {value}", decl.signature)),
                None => code_block(&decl.signature),
            }
        }
        ObjectKind::Var { decl, index } => {
            let var = env.var(*decl, *index)?;
            let owner = &env.decl(*decl).signature;
            format!(
                "{}\nbound in `{owner}`",
                code_block(&format!("{}: {}", var.name, var.ty))
            )
        }
        ObjectKind::Atom(name) => match env.binding_by_name(name) {
            Some(id) => {
                let binding = env.binding(id);
                code_block(&format!("(def {} {})", binding.name, binding.value))
            }
            None if lang_check::is_builtin(name) => format!("builtin `{name}`"),
            None => return None,
        },
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: markdown,
        }),
        range: Some(snapshot.line_index.range(span)),
    })
}

fn code_block(body: &str) -> String {
    format!("```mm1\n{body}\n```")
}
