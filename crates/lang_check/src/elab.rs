use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

use lang_ast::{
    Ast, Decl, DeclKind, Formula, Ident, MathToken, SExpr, SExprKind, Span, StmtKind, Type,
};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::builtins::{is_builtin, LAMBDA_FORMS};
use crate::env::{
    Binding, CompletionScope, DeclId, DeclInfo, Environment, ObjectKind, SortInfo, VarInfo,
};
use crate::{Cancelled, ElabError, ElabLevel, Elaborated};

/// Binder variables visible while checking one declaration.
type VarScope = FxHashMap<SmolStr, usize>;

pub(crate) struct ElabCtx {
    env: Environment,
    errors: Vec<ElabError>,
    marker: Option<usize>,
}

impl ElabCtx {
    pub(crate) fn new(marker: Option<usize>) -> Self {
        let mut env = Environment::default();
        env.completion = marker.map(|offset| CompletionScope { offset, decl: None });
        ElabCtx {
            env,
            errors: Vec::new(),
            marker,
        }
    }

    pub(crate) fn run(mut self, ast: &Ast, cancel: &AtomicBool) -> Result<Elaborated, Cancelled> {
        for (_, stmt) in ast.iter() {
            if cancel.load(Ordering::Relaxed) {
                log::debug!("elaboration cancelled before statement at {:?}", stmt.span);
                return Err(Cancelled);
            }
            match &stmt.kind {
                StmtKind::Sort { name } => self.sort_stmt(stmt.span, name),
                StmtKind::Decl(decl) => self.decl_stmt(stmt.span, decl),
                StmtKind::Do { forms } => {
                    for form in forms {
                        self.do_form(form);
                    }
                }
            }
        }
        self.env.spans.finish();
        Ok(Elaborated {
            errors: self.errors,
            env: self.env,
        })
    }

    /// Identifiers the cursor is touching are still being typed.
    fn is_incomplete(&self, span: Span) -> bool {
        self.marker.is_some_and(|m| span.contains(m))
    }

    fn error(&mut self, err: ElabError) {
        self.errors.push(err);
    }

    // ==========================================================================
    // Statements
    // ==========================================================================

    fn sort_stmt(&mut self, span: Span, name: &Ident) {
        if let Some(prev) = self.env.sort_by_name(&name.name) {
            let prev_span = self.env.sort(prev).name_span;
            self.error(
                ElabError::new(
                    ElabLevel::Error,
                    name.span,
                    format!("duplicate sort `{}`", name.name),
                )
                .with_related(prev_span, "first declared here"),
            );
        }
        let id = self.env.add_sort(SortInfo {
            name: name.name.clone(),
            name_span: name.span,
            span,
        });
        self.env.spans.push(name.span, ObjectKind::Sort(id));
    }

    fn decl_stmt(&mut self, span: Span, decl: &Decl) {
        let name = &decl.name;
        if let Some(prev) = self.env.decl_by_name(&name.name) {
            let prev_span = self.env.decl(prev).name_span;
            self.error(
                ElabError::new(
                    ElabLevel::Error,
                    name.span,
                    format!("duplicate declaration `{}`", name.name),
                )
                .with_related(prev_span, "first declared here"),
            );
        }

        let id = self.env.add_decl(DeclInfo {
            kind: decl.kind,
            name: name.name.clone(),
            name_span: name.span,
            span,
            vars: Vec::new(),
            ret: decl.ret.to_string(),
            value: decl.value.as_ref().map(ToString::to_string),
            signature: signature(decl),
        });
        self.env.spans.push(name.span, ObjectKind::Decl(id));

        if let Some(m) = self.marker.filter(|&m| span.contains(m)) {
            self.env.completion = Some(CompletionScope {
                offset: m,
                decl: Some(id),
            });
        }

        let mut scope = VarScope::default();
        let mut vars: Vec<VarInfo> = Vec::new();
        for binder in &decl.binders {
            // A binder's type only sees the binders before it.
            self.check_type(&binder.ty, id, &scope);
            for var in &binder.vars {
                if let Some(&first) = scope.get(&var.name) {
                    self.error(
                        ElabError::new(
                            ElabLevel::Error,
                            var.span,
                            format!("duplicate variable `{}`", var.name),
                        )
                        .with_related(vars[first].span, "first bound here"),
                    );
                }
                let index = vars.len();
                vars.push(VarInfo {
                    name: var.name.clone(),
                    span: var.span,
                    ty: binder.ty.to_string(),
                });
                scope.insert(var.name.clone(), index);
                self.env.spans.push(var.span, ObjectKind::Var { decl: id, index });
            }
        }
        self.env.decl_mut(id).vars = vars;

        self.check_type(&decl.ret, id, &scope);

        match (&decl.value, decl.kind) {
            (None, DeclKind::Def) => self.error(ElabError::new(
                ElabLevel::Warning,
                name.span,
                format!("definition `{}` has no body", name.name),
            )),
            (None, _) => {}
            (Some(value), DeclKind::Def) => self.check_formula(value, id, &scope),
            (Some(value), kind) => {
                self.error(ElabError::new(
                    ElabLevel::Error,
                    value.span,
                    format!("`{kind}` declarations cannot have a value"),
                ));
                self.check_formula(value, id, &scope);
            }
        }
    }

    fn check_type(&mut self, ty: &Type, decl: DeclId, scope: &VarScope) {
        match ty {
            Type::Sort(ident) => match self.env.sort_by_name(&ident.name) {
                Some(sort) => self.env.spans.push(ident.span, ObjectKind::Sort(sort)),
                None if self.is_incomplete(ident.span) => {}
                None => self.error(ElabError::new(
                    ElabLevel::Error,
                    ident.span,
                    format!("unknown sort `{}`", ident.name),
                )),
            },
            Type::Formula(formula) => self.check_formula(formula, decl, scope),
        }
    }

    fn check_formula(&mut self, formula: &Formula, decl: DeclId, scope: &VarScope) {
        for tok in &formula.tokens {
            let MathToken::Ident(ident) = tok else {
                continue;
            };
            if let Some(&index) = scope.get(&ident.name) {
                self.env
                    .spans
                    .push(ident.span, ObjectKind::Var { decl, index });
            } else if let Some(target) = self.env.decl_by_name(&ident.name) {
                self.env.spans.push(ident.span, ObjectKind::Decl(target));
            } else if !self.is_incomplete(ident.span) {
                self.error(ElabError::new(
                    ElabLevel::Error,
                    ident.span,
                    format!("unknown math identifier `{}`", ident.name),
                ));
            }
        }
    }

    // ==========================================================================
    // do-blocks
    // ==========================================================================

    fn do_form(&mut self, form: &SExpr) {
        if let Some([head, name, value]) = form.as_list() {
            let head_atom = head.as_atom().map(SmolStr::as_str);
            if let (Some("def"), Some(bound)) = (head_atom, name.as_atom()) {
                self.env
                    .spans
                    .push(head.span, ObjectKind::Atom(SmolStr::new_static("def")));
                self.define(form.span, bound.clone(), name.span, value);
                return;
            }
        }
        self.check_sexpr(form, &mut Vec::new());
    }

    fn define(&mut self, span: Span, name: SmolStr, name_span: Span, value: &SExpr) {
        if let Some(prev) = self.env.binding_by_name(&name) {
            let prev_span = self.env.binding(prev).name_span;
            self.error(
                ElabError::new(
                    ElabLevel::Info,
                    name_span,
                    format!("`{name}` shadows an earlier binding"),
                )
                .with_related(prev_span, "previous binding"),
            );
        }
        let is_lambda = value
            .as_list()
            .and_then(|items| items.first())
            .and_then(SExpr::as_atom)
            .is_some_and(|head| LAMBDA_FORMS.contains(&head.as_str()));
        self.env.add_binding(Binding {
            name: name.clone(),
            name_span,
            span,
            value: value.to_string(),
            is_lambda,
        });
        self.env.spans.push(name_span, ObjectKind::Atom(name));
        self.check_sexpr(value, &mut Vec::new());
    }

    fn check_sexpr(&mut self, expr: &SExpr, locals: &mut Vec<SmolStr>) {
        match &expr.kind {
            SExprKind::Number(_) => {}
            SExprKind::Atom(atom) => self.check_atom(atom, expr.span, locals),
            SExprKind::List(items) => {
                let head = items.first().and_then(SExpr::as_atom).map(SmolStr::as_str);
                match (head, items.as_slice()) {
                    (Some("quote"), [head, ..]) => {
                        self.check_sexpr(head, locals);
                    }
                    (Some(h), [head, params, body @ ..]) if LAMBDA_FORMS.contains(&h) => {
                        self.check_sexpr(head, locals);
                        let depth = locals.len();
                        match &params.kind {
                            SExprKind::List(ps) => {
                                locals.extend(ps.iter().filter_map(SExpr::as_atom).cloned())
                            }
                            SExprKind::Atom(rest) => locals.push(rest.clone()),
                            SExprKind::Number(_) => {}
                        }
                        for e in body {
                            self.check_sexpr(e, locals);
                        }
                        locals.truncate(depth);
                    }
                    (Some("let" | "letrec"), [head, bindings, body @ ..]) => {
                        self.check_sexpr(head, locals);
                        let depth = locals.len();
                        for binding in bindings.as_list().unwrap_or_default() {
                            match binding.as_list() {
                                Some([name, values @ ..]) => {
                                    for v in values {
                                        self.check_sexpr(v, locals);
                                    }
                                    if let Some(name) = name.as_atom() {
                                        locals.push(name.clone());
                                    }
                                }
                                _ => self.check_sexpr(binding, locals),
                            }
                        }
                        for e in body {
                            self.check_sexpr(e, locals);
                        }
                        locals.truncate(depth);
                    }
                    _ => {
                        for e in items {
                            self.check_sexpr(e, locals);
                        }
                    }
                }
            }
        }
    }

    fn check_atom(&mut self, atom: &SmolStr, span: Span, locals: &[SmolStr]) {
        if locals.contains(atom) {
            return;
        }
        if self.env.binding_by_name(atom).is_some() || is_builtin(atom) {
            self.env.spans.push(span, ObjectKind::Atom(atom.clone()));
        } else if !self.is_incomplete(span) {
            self.error(ElabError::new(
                ElabLevel::Warning,
                span,
                format!("unknown atom `{atom}`"),
            ));
        }
    }
}

/// `term imp (a b: wff): wff`
fn signature(decl: &Decl) -> String {
    let mut out = format!("{} {}", decl.kind, decl.name.name);
    for binder in &decl.binders {
        let vars: Vec<&str> = binder.vars.iter().map(|v| v.name.as_str()).collect();
        let _ = write!(out, " ({}: {})", vars.join(" "), binder.ty);
    }
    let _ = write!(out, ": {}", decl.ret);
    out
}
