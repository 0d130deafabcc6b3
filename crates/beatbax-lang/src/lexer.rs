//! Source tokenizer.
//!
//! Walks the source text once, left to right, producing a flat token
//! stream. Whitespace is skipped; `#` begins a line comment. Notes are
//! lexed as plain identifiers here — they're only validated as note
//! shapes once the parser knows it's inside a pattern body.

use crate::error::{ParseError, Position};
use crate::token::{TokKind, Token};

/// Cursor-based tokenizer over a source string, tracking 1-indexed
/// line/column positions as it scans.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    index: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    /// Create a lexer over `source`.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            index: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire source, returning all tokens including a
    /// trailing `Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = matches!(tok.kind, TokKind::Eof);
            out.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(out)
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.col)
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.index..].chars().next()
    }

    fn peek_char_at(&self, offset_chars: usize) -> Option<char> {
        self.source[self.index..].chars().nth(offset_chars)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.index += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments();
        let start = self.pos();
        let Some(c) = self.peek_char() else {
            return Ok(Token {
                kind: TokKind::Eof,
                start,
                end: start,
            });
        };

        if c == '"' || c == '\'' {
            return self.lex_string(c, start);
        }

        if c == '=' && self.peek_char_at(1) == Some('>') {
            self.advance();
            self.advance();
            return Ok(Token {
                kind: TokKind::Arrow,
                start,
                end: self.pos(),
            });
        }

        if c.is_ascii_digit() || (c == '-' && self.peek_char_at(1).is_some_and(|d| d.is_ascii_digit())) {
            return self.lex_number(start);
        }

        if c.is_alphabetic() || c == '_' {
            return self.lex_ident(start);
        }

        if crate::token::PUNCT_CHARS.contains(&c) {
            self.advance();
            return Ok(Token {
                kind: TokKind::Punct(c),
                start,
                end: self.pos(),
            });
        }

        Err(ParseError::at(format!("unexpected character '{c}'"), start))
    }

    fn lex_ident(&mut self, start: Position) -> Result<Token, ParseError> {
        let begin = self.index;
        while let Some(c) = self.peek_char() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                self.advance();
            } else {
                break;
            }
        }
        let text = self.source[begin..self.index].to_string();
        Ok(Token {
            kind: TokKind::Ident(text),
            start,
            end: self.pos(),
        })
    }

    fn lex_number(&mut self, start: Position) -> Result<Token, ParseError> {
        let begin = self.index;
        if self.peek_char() == Some('-') {
            self.advance();
        }
        let mut is_float = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.advance();
            } else if c == '.' && self.peek_char_at(1).is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.source[begin..self.index];
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::at(format!("malformed decimal literal '{text}'"), start))?;
            Ok(Token {
                kind: TokKind::Float(value),
                start,
                end: self.pos(),
            })
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| ParseError::at(format!("malformed integer literal '{text}'"), start))?;
            Ok(Token {
                kind: TokKind::Int(value),
                start,
                end: self.pos(),
            })
        }
    }

    fn lex_string(&mut self, quote: char, start: Position) -> Result<Token, ParseError> {
        let triple = self.peek_char() == Some(quote)
            && self.peek_char_at(1) == Some(quote)
            && self.peek_char_at(2) == Some(quote);

        if triple {
            self.advance();
            self.advance();
            self.advance();
            let begin = self.index;
            loop {
                if self.peek_char() == Some(quote)
                    && self.peek_char_at(1) == Some(quote)
                    && self.peek_char_at(2) == Some(quote)
                {
                    let text = self.source[begin..self.index].to_string();
                    self.advance();
                    self.advance();
                    self.advance();
                    return Ok(Token {
                        kind: TokKind::Str(text),
                        start,
                        end: self.pos(),
                    });
                }
                if self.advance().is_none() {
                    return Err(ParseError::spanning(
                        "unterminated triple-quoted string",
                        start,
                        self.pos(),
                    ));
                }
            }
        }

        self.advance();
        let mut out = String::new();
        loop {
            match self.peek_char() {
                None | Some('\n') => {
                    return Err(ParseError::spanning("unterminated string", start, self.pos()));
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.advance() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some(c) => out.push(c),
                        None => {
                            return Err(ParseError::spanning("unterminated string", start, self.pos()));
                        }
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token {
            kind: TokKind::Str(out),
            start,
            end: self.pos(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn skips_comments_and_whitespace() {
        let toks = kinds("bpm 120 # trailing comment\nchip gameboy");
        assert_eq!(
            toks,
            vec![
                TokKind::Ident("bpm".into()),
                TokKind::Int(120),
                TokKind::Ident("chip".into()),
                TokKind::Ident("gameboy".into()),
                TokKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_arrow_and_punct() {
        let toks = kinds("channel 1 => inst lead seq main");
        assert!(toks.contains(&TokKind::Arrow));
        assert!(!toks.contains(&TokKind::Punct(',')));
    }

    #[test]
    fn lexes_note_like_identifiers() {
        let toks = kinds("pat mel = C4 E4 G4 C5");
        assert_eq!(toks[4], TokKind::Ident("C4".into()));
    }

    #[test]
    fn lexes_triple_quoted_strings_with_hash() {
        let toks = kinds("inst x note=\"\"\"line one\n# not a comment\nline two\"\"\"");
        match &toks[3] {
            TokKind::Str(s) => assert!(s.contains("# not a comment")),
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = Lexer::new("inst x note=\"oops").tokenize().unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn lexes_negative_integer() {
        let toks = kinds("transpose(-2)");
        assert!(toks.contains(&TokKind::Int(-2)));
    }
}
