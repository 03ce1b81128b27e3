// ==============================================================================
// Recovering statement parser
// ==============================================================================
//
//   file    := stmt*
//   stmt    := 'sort' IDENT ';'
//            | ('term' | 'axiom' | 'def' | 'theorem') IDENT binder* ':' type ('=' formula)? ';'
//            | 'do' '{' sexpr* '}' ';'
//   binder  := '(' IDENT+ ':' type ')'
//   type    := IDENT | formula
//   formula := '$' token* '$'
//   sexpr   := atom | number | '(' sexpr* ')'
//
// On the first error inside a statement the parser records it and skips to the
// token after the next `;`, so each malformed statement costs exactly one error.

use smol_str::SmolStr;

use crate::lexer::{tokenize, Keyword, Token, TokenKind};
use crate::{
    Ast, Binder, Decl, DeclKind, Formula, Ident, MathToken, ParseError, ParseErrorKind, Parsed,
    SExpr, SExprKind, Span, Stmt, StmtKind, Type,
};

/// Parse a source file.
pub fn parse(src: &str) -> Parsed {
    Parser::new(src, None).parse_file()
}

/// Parse a source file with a zero-width completion marker at `marker`.
pub fn parse_with_marker(src: &str, marker: usize) -> Parsed {
    Parser::new(src, Some(marker)).parse_file()
}

type PResult<T> = Result<T, ParseError>;

struct Parser<'a> {
    src: &'a str,
    toks: Vec<Token>,
    pos: usize,
    marker: Option<usize>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, marker: Option<usize>) -> Self {
        let mut seen_marker = None;
        let toks = tokenize(src, marker)
            .into_iter()
            .filter(|t| {
                if t.kind == TokenKind::Marker {
                    seen_marker = Some(t.span.start);
                    false
                } else {
                    true
                }
            })
            .collect();
        Parser {
            src,
            toks,
            pos: 0,
            marker: seen_marker,
        }
    }

    fn parse_file(mut self) -> Parsed {
        let mut parsed = Parsed::default();
        parsed.tree.marker = self.marker;
        while self.peek().is_some() {
            let start = self.pos;
            match self.stmt() {
                Ok(stmt) => {
                    parsed.tree.push(stmt);
                }
                Err(err) => {
                    log::debug!("parse error at {:?}: {}", err.span, err.kind);
                    parsed.errors.push(err);
                    self.recover(start);
                }
            }
        }
        parsed
    }

    // ==========================================================================
    // Token cursor
    // ==========================================================================

    fn peek(&self) -> Option<Token> {
        self.toks.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.peek()?;
        self.pos += 1;
        Some(tok)
    }

    fn text(&self, span: Span) -> &'a str {
        &self.src[span.start..span.end]
    }

    fn eof_span(&self) -> Span {
        Span::new(self.src.len(), self.src.len())
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        match self.peek() {
            Some(tok) => ParseError {
                span: tok.span,
                kind: ParseErrorKind::Unexpected {
                    expected,
                    found: format!("`{}`", self.text(tok.span)).into(),
                },
            },
            None => ParseError {
                span: self.eof_span(),
                kind: ParseErrorKind::Unexpected {
                    expected,
                    found: "end of file".into(),
                },
            },
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> PResult<Token> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.pos += 1;
                Ok(tok)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn ident(&mut self, expected: &'static str) -> PResult<Ident> {
        let tok = self.expect(TokenKind::Ident, expected)?;
        Ok(Ident {
            name: self.text(tok.span).into(),
            span: tok.span,
        })
    }

    /// Skip past the next `;`. Always consumes at least one token so the
    /// outer loop makes progress.
    fn recover(&mut self, start: usize) {
        if self.pos == start {
            self.pos += 1;
        }
        // The failing token may itself be the terminator.
        if self.pos > 0 && self.toks[self.pos - 1].kind == TokenKind::Semi {
            return;
        }
        while let Some(tok) = self.bump() {
            if tok.kind == TokenKind::Semi {
                break;
            }
        }
    }

    // ==========================================================================
    // Statements
    // ==========================================================================

    fn stmt(&mut self) -> PResult<Stmt> {
        let Some(first) = self.peek() else {
            return Err(self.unexpected("a statement"));
        };
        let kind = match first.kind {
            TokenKind::Keyword(Keyword::Sort) => {
                self.bump();
                let name = self.ident("a sort name")?;
                StmtKind::Sort { name }
            }
            TokenKind::Keyword(kw @ (Keyword::Term | Keyword::Axiom | Keyword::Def | Keyword::Theorem)) => {
                self.bump();
                let kind = match kw {
                    Keyword::Term => DeclKind::Term,
                    Keyword::Axiom => DeclKind::Axiom,
                    Keyword::Def => DeclKind::Def,
                    _ => DeclKind::Theorem,
                };
                StmtKind::Decl(self.decl(kind)?)
            }
            TokenKind::Keyword(Keyword::Do) => {
                self.bump();
                StmtKind::Do {
                    forms: self.do_block()?,
                }
            }
            _ => {
                return Err(ParseError {
                    span: first.span,
                    kind: ParseErrorKind::ExpectedStatement(
                        format!("`{}`", self.text(first.span)).into(),
                    ),
                })
            }
        };
        let semi = self.expect(TokenKind::Semi, "`;`")?;
        Ok(Stmt {
            span: first.span.cover(semi.span),
            kind,
        })
    }

    fn decl(&mut self, kind: DeclKind) -> PResult<Decl> {
        let name = self.ident("a declaration name")?;
        let mut binders = Vec::new();
        while self.peek_kind() == Some(TokenKind::LParen) {
            binders.push(self.binder()?);
        }
        self.expect(TokenKind::Colon, "`:` or a binder")?;
        let ret = self.ty()?;
        let value = if self.peek_kind() == Some(TokenKind::Eq) {
            self.bump();
            Some(self.formula()?)
        } else {
            None
        };
        Ok(Decl {
            kind,
            name,
            binders,
            ret,
            value,
        })
    }

    fn binder(&mut self) -> PResult<Binder> {
        let open = self.expect(TokenKind::LParen, "`(`")?;
        let mut vars = vec![self.ident("a variable name")?];
        while self.peek_kind() == Some(TokenKind::Ident) {
            vars.push(self.ident("a variable name")?);
        }
        self.expect(TokenKind::Colon, "`:`")?;
        let ty = self.ty()?;
        let close = self.expect(TokenKind::RParen, "`)`")?;
        Ok(Binder {
            span: open.span.cover(close.span),
            vars,
            ty,
        })
    }

    fn ty(&mut self) -> PResult<Type> {
        match self.peek_kind() {
            Some(TokenKind::Dollar) => Ok(Type::Formula(self.formula()?)),
            Some(TokenKind::Ident) => Ok(Type::Sort(self.ident("a sort name")?)),
            _ => Err(self.unexpected("a sort name or a formula")),
        }
    }

    fn formula(&mut self) -> PResult<Formula> {
        let open = self.expect(TokenKind::Dollar, "`$`")?;
        let mut tokens = Vec::new();
        loop {
            let Some(tok) = self.bump() else {
                return Err(ParseError {
                    span: Span::new(open.span.start, self.src.len()),
                    kind: ParseErrorKind::UnterminatedFormula,
                });
            };
            match tok.kind {
                TokenKind::Dollar => {
                    return Ok(Formula {
                        span: open.span.cover(tok.span),
                        tokens,
                    })
                }
                TokenKind::Ident => tokens.push(MathToken::Ident(Ident {
                    name: self.text(tok.span).into(),
                    span: tok.span,
                })),
                _ => tokens.push(MathToken::Symbol {
                    text: self.text(tok.span).into(),
                    span: tok.span,
                }),
            }
        }
    }

    // ==========================================================================
    // do-blocks
    // ==========================================================================

    fn do_block(&mut self) -> PResult<Vec<SExpr>> {
        let open = self.expect(TokenKind::LBrace, "`{`")?;
        let mut forms = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::RBrace) => {
                    self.bump();
                    return Ok(forms);
                }
                None => {
                    return Err(ParseError {
                        span: open.span,
                        kind: ParseErrorKind::Unclosed('{'),
                    })
                }
                _ => forms.push(self.sexpr()?),
            }
        }
    }

    fn sexpr(&mut self) -> PResult<SExpr> {
        let Some(tok) = self.peek() else {
            return Err(self.unexpected("an expression"));
        };
        match tok.kind {
            TokenKind::LParen => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    match self.peek_kind() {
                        Some(TokenKind::RParen) => {
                            let close = self.bump().map_or(tok.span, |t| t.span);
                            return Ok(SExpr {
                                span: tok.span.cover(close),
                                kind: SExprKind::List(items),
                            });
                        }
                        None => {
                            return Err(ParseError {
                                span: tok.span,
                                kind: ParseErrorKind::Unclosed('('),
                            })
                        }
                        _ => items.push(self.sexpr()?),
                    }
                }
            }
            TokenKind::Number => {
                self.bump();
                Ok(SExpr {
                    span: tok.span,
                    kind: SExprKind::Number(self.text(tok.span).into()),
                })
            }
            TokenKind::Ident
            | TokenKind::Keyword(_)
            | TokenKind::Symbol
            | TokenKind::Colon
            | TokenKind::Eq => {
                self.bump();
                let text: SmolStr = self.text(tok.span).into();
                Ok(SExpr {
                    span: tok.span,
                    kind: SExprKind::Atom(text),
                })
            }
            _ => Err(self.unexpected("an expression")),
        }
    }
}
