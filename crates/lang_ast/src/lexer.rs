// ==============================================================================
// Lexer
// ==============================================================================
//
// Context-free tokenizer. Formula contents are tokenized like everything else;
// the parser decides how to read them. `--` starts a line comment.
//
// When a marker offset is given, a zero-width `Marker` token is emitted at that
// offset, splitting an identifier if the cursor sits inside one.

use crate::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Sort,
    Term,
    Axiom,
    Def,
    Theorem,
    Do,
}

impl Keyword {
    fn from_ident(text: &str) -> Option<Keyword> {
        Some(match text {
            "sort" => Keyword::Sort,
            "term" => Keyword::Term,
            "axiom" => Keyword::Axiom,
            "def" => Keyword::Def,
            "theorem" => Keyword::Theorem,
            "do" => Keyword::Do,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Keyword(Keyword),
    /// A run of punctuation that is not a delimiter, e.g. `->` or `+`.
    Symbol,
    Dollar,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Colon,
    Semi,
    Eq,
    Marker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn is_ident_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b'\''
}

fn is_delimiter(c: u8) -> bool {
    matches!(c, b'$' | b'(' | b')' | b'{' | b'}' | b':' | b';' | b'=')
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    marker: Option<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, marker: Option<usize>) -> Self {
        // A marker past the end still completes at end of file.
        let marker = marker.map(|m| m.min(src.len()));
        Lexer {
            src,
            pos: 0,
            marker,
        }
    }

    /// Offset of the marker, if it has not been emitted yet.
    fn pending_marker(&self) -> Option<usize> {
        self.marker
    }

    fn take_marker_at(&mut self, pos: usize) -> Option<Token> {
        if self.marker == Some(pos) {
            self.marker = None;
            return Some(Token {
                kind: TokenKind::Marker,
                span: Span::new(pos, pos),
            });
        }
        None
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    /// Skip whitespace and comments, stopping early at the marker so it lands
    /// between the right tokens.
    fn skip_trivia(&mut self) {
        loop {
            if self.pending_marker() == Some(self.pos) {
                return;
            }
            match self.peek_byte() {
                Some(c) if c.is_ascii_whitespace() => self.pos += 1,
                Some(b'-') if self.bytes().get(self.pos + 1) == Some(&b'-') => {
                    let rest = &self.src[self.pos..];
                    let end = rest.find('\n').map_or(self.src.len(), |i| self.pos + i);
                    // A marker inside a comment is dropped: there is nothing to complete.
                    if let Some(m) = self.pending_marker() {
                        if m > self.pos && m <= end {
                            self.marker = None;
                        }
                    }
                    self.pos = end;
                }
                _ => return,
            }
        }
    }

    /// Advance while `pred` holds, never crossing the marker.
    fn eat_while(&mut self, pred: impl Fn(u8) -> bool) {
        while let Some(c) = self.peek_byte() {
            if !pred(c) || self.pending_marker() == Some(self.pos) {
                break;
            }
            self.pos += 1;
        }
    }

    pub fn next_token(&mut self) -> Option<Token> {
        self.skip_trivia();
        let start = self.pos;
        if let Some(tok) = self.take_marker_at(start) {
            return Some(tok);
        }
        let c = self.peek_byte()?;

        let kind = match c {
            b'$' => Some(TokenKind::Dollar),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b'{' => Some(TokenKind::LBrace),
            b'}' => Some(TokenKind::RBrace),
            b':' => Some(TokenKind::Colon),
            b';' => Some(TokenKind::Semi),
            b'=' => Some(TokenKind::Eq),
            _ => None,
        };
        if let Some(kind) = kind {
            self.pos += 1;
            return Some(Token {
                kind,
                span: Span::new(start, self.pos),
            });
        }

        if is_ident_char(c) {
            self.eat_while(is_ident_char);
            let text = &self.src[start..self.pos];
            let kind = if text.bytes().all(|b| b.is_ascii_digit()) {
                TokenKind::Number
            } else if let Some(kw) = Keyword::from_ident(text) {
                TokenKind::Keyword(kw)
            } else {
                TokenKind::Ident
            };
            return Some(Token {
                kind,
                span: Span::new(start, self.pos),
            });
        }

        // Everything else is a symbol run. Step over whole chars so that
        // non-ASCII input never splits a code point.
        let ch_len = self.src[start..].chars().next().map_or(1, char::len_utf8);
        self.pos += ch_len;
        self.eat_while(|b| {
            b.is_ascii() && !b.is_ascii_whitespace() && !is_ident_char(b) && !is_delimiter(b)
        });
        // Do not swallow the start of a trailing comment.
        if let Some(i) = self.src[start..self.pos].find("--") {
            if i > 0 {
                self.pos = start + i;
            }
        }
        Some(Token {
            kind: TokenKind::Symbol,
            span: Span::new(start, self.pos),
        })
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Tokenize the whole source.
pub fn tokenize(src: &str, marker: Option<usize>) -> Vec<Token> {
    Lexer::new(src, marker).collect()
}
