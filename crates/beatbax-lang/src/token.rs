//! Token types produced by the lexer.

use crate::error::Position;

/// A single punctuation character recognized by the lexer.
pub const PUNCT_CHARS: &[char] = &['=', ':', ',', '*', '.', '(', ')', '[', ']', '{', '}', '<', '>', '|'];

/// The kind of a lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokKind {
    /// `[A-Za-z_][A-Za-z0-9_-]*` — keywords, identifiers, and note/pattern
    /// tokens are all lexed as identifiers; the parser disambiguates by
    /// context.
    Ident(String),
    /// An integer literal.
    Int(i64),
    /// A decimal literal.
    Float(f64),
    /// A quoted string (single, double, or triple-quoted). Triple-quoted
    /// strings preserve embedded newlines and `#` characters verbatim.
    Str(String),
    /// A single punctuation character.
    Punct(char),
    /// The `=>` arrow.
    Arrow,
    /// End of input.
    Eof,
}

/// A lexed token with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokKind,
    /// Start position (inclusive).
    pub start: Position,
    /// End position (exclusive).
    pub end: Position,
}

impl Token {
    /// Render a short human-readable description, used in parse error
    /// messages (`"identifier 'bpm'"`, `"'=>'"`, ...).
    pub fn describe(&self) -> String {
        match &self.kind {
            TokKind::Ident(s) => format!("identifier '{s}'"),
            TokKind::Int(n) => format!("integer '{n}'"),
            TokKind::Float(n) => format!("number '{n}'"),
            TokKind::Str(s) => format!("string \"{s}\""),
            TokKind::Punct(c) => format!("'{c}'"),
            TokKind::Arrow => "'=>'".to_string(),
            TokKind::Eof => "end of input".to_string(),
        }
    }
}
