//! Recursive-descent parser: token stream → [`Song`] AST.
//!
//! Top-level statements are declarative and order-free: the
//! parser loops reading one keyword-led statement at a time until `Eof`.
//! Unknown top-level keywords are a fatal [`ParseError`]; unknown sequence
//! transforms are not (those become [`crate::ast::SeqMod::Unknown`] and are
//! reported as resolver warnings downstream).

use std::collections::HashMap;

use crate::ast::{
    ChannelBinding, Envelope, EffectSpec, ExportDirective, ImportDecl, Instrument, InstrumentType,
    NoiseParams, Pan, PatItem, PatTokenKind, PlayDirective, SeqItem, SeqMod, Song, Sweep, Direction,
};
use crate::error::{ParseError, Position};
use crate::lexer::Lexer;
use crate::notes::looks_like_note;
use crate::token::{TokKind, Token};

const TOP_LEVEL_KEYWORDS: &[&str] = &[
    "chip",
    "bpm",
    "time",
    "stepsPerBar",
    "ticksPerStep",
    "inst",
    "pat",
    "seq",
    "channel",
    "import",
    "play",
    "export",
    "song",
    "effect",
    "arrange",
    "from",
];

/// Parse a complete source string into a [`Song`] AST.
pub fn parse(source: &str) -> Result<Song, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser { tokens, pos: 0 }.parse_song()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// An instrument-field value as written in source, before it's interpreted
/// against a known field name.
#[derive(Debug, Clone)]
enum FieldValue {
    Num(f64),
    Str(String),
    Ident(String),
    Gb(Vec<String>),
    Array(Vec<FieldValue>),
    Object(Vec<(String, FieldValue)>),
}

impl FieldValue {
    fn render(&self) -> String {
        match self {
            FieldValue::Num(n) => format!("{n}"),
            FieldValue::Str(s) | FieldValue::Ident(s) => s.clone(),
            FieldValue::Gb(parts) => format!("gb:{}", parts.join(",")),
            FieldValue::Array(items) => {
                let parts: Vec<String> = items.iter().map(FieldValue::render).collect();
                format!("[{}]", parts.join(","))
            }
            FieldValue::Object(fields) => {
                let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}:{}", v.render())).collect();
                format!("{{{}}}", parts.join(","))
            }
        }
    }

    fn as_num(&self) -> Option<f64> {
        match self {
            FieldValue::Num(n) => Some(*n),
            FieldValue::Str(s) | FieldValue::Ident(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) | FieldValue::Ident(s) => Some(s),
            _ => None,
        }
    }

    fn object_fields(&self) -> Option<&[(String, FieldValue)]> {
        match self {
            FieldValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    fn array_items(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

fn direction_from_str(s: &str) -> Option<Direction> {
    match s.to_ascii_lowercase().as_str() {
        "up" => Some(Direction::Up),
        "down" => Some(Direction::Down),
        _ => None,
    }
}

impl Parser {
    // ---- token cursor -----------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokKind::Eof) | None)
    }

    fn here(&self) -> Position {
        self.peek().map(|t| t.start).unwrap_or(Position::new(0, 0))
    }

    fn check_punct(&self, c: char) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokKind::Punct(p)) if *p == c)
    }

    fn peek_ident_text(&self) -> Option<&str> {
        match self.peek().map(|t| &t.kind) {
            Some(TokKind::Ident(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        if self.check_punct(c) {
            self.advance();
            Ok(())
        } else {
            let tok = self.peek().cloned();
            let (desc, pos) = tok
                .map(|t| (t.describe(), t.start))
                .unwrap_or(("end of input".to_string(), self.here()));
            Err(ParseError::at(format!("expected '{c}', found {desc}"), pos))
        }
    }

    fn expect_arrow(&mut self) -> Result<(), ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokKind::Arrow) => {
                self.advance();
                Ok(())
            }
            _ => {
                let tok = self.peek().cloned();
                let (desc, pos) = tok
                    .map(|t| (t.describe(), t.start))
                    .unwrap_or(("end of input".to_string(), self.here()));
                Err(ParseError::at(format!("expected '=>', found {desc}"), pos))
            }
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Position), ParseError> {
        match self.peek().cloned() {
            Some(Token { kind: TokKind::Ident(s), start, .. }) => {
                self.advance();
                Ok((s, start))
            }
            Some(tok) => Err(ParseError::at(format!("expected identifier, found {}", tok.describe()), tok.start)),
            None => Err(ParseError::at("expected identifier, found end of input", self.here())),
        }
    }

    fn expect_str(&mut self) -> Result<(String, Position), ParseError> {
        match self.peek().cloned() {
            Some(Token { kind: TokKind::Str(s), start, .. }) => {
                self.advance();
                Ok((s, start))
            }
            Some(tok) => Err(ParseError::at(format!("expected string, found {}", tok.describe()), tok.start)),
            None => Err(ParseError::at("expected string, found end of input", self.here())),
        }
    }

    fn expect_ident_or_str(&mut self) -> Result<(String, Position), ParseError> {
        match self.peek().cloned() {
            Some(Token { kind: TokKind::Ident(s), start, .. }) => {
                self.advance();
                Ok((s, start))
            }
            Some(Token { kind: TokKind::Str(s), start, .. }) => {
                self.advance();
                Ok((s, start))
            }
            Some(tok) => Err(ParseError::at(format!("expected name, found {}", tok.describe()), tok.start)),
            None => Err(ParseError::at("expected name, found end of input", self.here())),
        }
    }

    fn expect_int(&mut self) -> Result<i64, ParseError> {
        match self.peek().cloned() {
            Some(Token { kind: TokKind::Int(n), .. }) => {
                self.advance();
                Ok(n)
            }
            Some(tok) => Err(ParseError::at(format!("expected integer, found {}", tok.describe()), tok.start)),
            None => Err(ParseError::at("expected integer, found end of input", self.here())),
        }
    }

    fn expect_number(&mut self) -> Result<f64, ParseError> {
        match self.peek().cloned() {
            Some(Token { kind: TokKind::Int(n), .. }) => {
                self.advance();
                Ok(n as f64)
            }
            Some(Token { kind: TokKind::Float(n), .. }) => {
                self.advance();
                Ok(n)
            }
            Some(tok) => Err(ParseError::at(format!("expected number, found {}", tok.describe()), tok.start)),
            None => Err(ParseError::at("expected number, found end of input", self.here())),
        }
    }

    fn consume_ident_if(&mut self, word: &str) -> bool {
        if self.peek_ident_text() == Some(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn at_top_level_boundary(&self) -> bool {
        if self.at_eof() {
            return true;
        }
        match self.peek_ident_text() {
            Some(word) => TOP_LEVEL_KEYWORDS.contains(&word),
            None => false,
        }
    }

    fn skip_to_top_level_boundary(&mut self) {
        while !self.at_top_level_boundary() {
            self.advance();
        }
    }

    fn skip_separators(&mut self) {
        while self.check_punct(',') {
            self.advance();
        }
    }

    // ---- top level ----------------------------------------------------

    fn parse_song(&mut self) -> Result<Song, ParseError> {
        let mut song = Song::new();
        loop {
            if self.at_eof() {
                break;
            }
            let (kw, kwpos) = self.expect_ident()?;
            match kw.as_str() {
                "chip" => {
                    let (v, _) = self.expect_ident_or_str()?;
                    song.chip = Some(v);
                }
                "bpm" => song.bpm = self.expect_number()?,
                "time" => song.time = self.expect_number()?,
                "stepsPerBar" => song.steps_per_bar = self.expect_int()? as u32,
                "ticksPerStep" => song.ticks_per_step = self.expect_int()? as u32,
                "inst" => {
                    let inst = self.parse_inst()?;
                    song.insts.insert(inst.name.clone(), inst);
                }
                "pat" => {
                    let (name, mods) = self.parse_pat_header()?;
                    self.expect_punct('=')?;
                    let body = self.parse_pattern_body()?;
                    song.pats.insert(name.clone(), body);
                    if !mods.is_empty() {
                        song.pat_mods.insert(name, mods);
                    }
                }
                "seq" => {
                    let (name, _) = self.expect_ident()?;
                    self.expect_punct('=')?;
                    let items = self.parse_seq_body()?;
                    song.seqs.insert(name, items);
                }
                "channel" => {
                    let ch = self.parse_channel()?;
                    song.channels.push(ch);
                }
                "import" => {
                    let (url, _) = self.expect_str()?;
                    song.imports.push(ImportDecl { url, pos: kwpos });
                }
                "play" => {
                    let repeat = self.consume_ident_if("repeat");
                    song.play = Some(PlayDirective { repeat });
                }
                "export" => {
                    let (fmt, _) = self.expect_ident_or_str()?;
                    let (path, _) = self.expect_str()?;
                    song.exports.push(ExportDirective { format: fmt, path });
                }
                // Reserved keywords with no grammar in this revision of the
                // language: consumed as no-ops rather than rejected, so
                // source using them doesn't hard-fail on a forward-looking
                // statement this parser doesn't yet understand.
                "song" | "effect" | "arrange" | "from" => {
                    self.skip_to_top_level_boundary();
                }
                other => {
                    return Err(ParseError::at(format!("unknown top-level keyword '{other}'"), kwpos));
                }
            }
        }
        Ok(song)
    }

    // ---- inst -----------------------------------------------------------

    fn parse_inst(&mut self) -> Result<Instrument, ParseError> {
        let (name, pos) = self.expect_ident()?;
        let mut fields: Vec<(String, FieldValue)> = Vec::new();
        loop {
            if self.at_top_level_boundary() {
                break;
            }
            let is_field = matches!(self.peek().map(|t| &t.kind), Some(TokKind::Ident(_)))
                && matches!(self.peek_at(1).map(|t| &t.kind), Some(TokKind::Punct('=')));
            if !is_field {
                break;
            }
            let (key, _) = self.expect_ident()?;
            self.expect_punct('=')?;
            let value = self.parse_field_value()?;
            fields.push((key, value));
        }
        build_instrument(name, pos, fields)
    }

    fn parse_field_value(&mut self) -> Result<FieldValue, ParseError> {
        match self.peek().cloned() {
            Some(Token { kind: TokKind::Int(n), .. }) => {
                self.advance();
                Ok(FieldValue::Num(n as f64))
            }
            Some(Token { kind: TokKind::Float(n), .. }) => {
                self.advance();
                Ok(FieldValue::Num(n))
            }
            Some(Token { kind: TokKind::Str(s), .. }) => {
                self.advance();
                Ok(FieldValue::Str(s))
            }
            Some(Token { kind: TokKind::Punct('{'), .. }) => self.parse_field_object(),
            Some(Token { kind: TokKind::Punct('['), .. }) => self.parse_field_array(),
            Some(Token { kind: TokKind::Ident(word), .. }) => {
                self.advance();
                if word == "gb" && self.check_punct(':') {
                    self.advance();
                    let mut parts = vec![self.parse_scalar_word()?];
                    while self.check_punct(',') {
                        self.advance();
                        parts.push(self.parse_scalar_word()?);
                    }
                    Ok(FieldValue::Gb(parts))
                } else {
                    Ok(FieldValue::Ident(word))
                }
            }
            Some(tok) => Err(ParseError::at(format!("expected instrument value, found {}", tok.describe()), tok.start)),
            None => Err(ParseError::at("expected instrument value, found end of input", self.here())),
        }
    }

    fn parse_scalar_word(&mut self) -> Result<String, ParseError> {
        match self.peek().cloned() {
            Some(Token { kind: TokKind::Ident(s), .. }) => {
                self.advance();
                Ok(s)
            }
            Some(Token { kind: TokKind::Str(s), .. }) => {
                self.advance();
                Ok(s)
            }
            Some(Token { kind: TokKind::Int(n), .. }) => {
                self.advance();
                Ok(n.to_string())
            }
            Some(Token { kind: TokKind::Float(n), .. }) => {
                self.advance();
                Ok(n.to_string())
            }
            Some(tok) => Err(ParseError::at(format!("expected value, found {}", tok.describe()), tok.start)),
            None => Err(ParseError::at("expected value, found end of input", self.here())),
        }
    }

    fn parse_field_object(&mut self) -> Result<FieldValue, ParseError> {
        self.expect_punct('{')?;
        let mut fields = Vec::new();
        loop {
            if self.check_punct('}') {
                break;
            }
            let (key, _) = self.expect_ident_or_str()?;
            self.expect_punct(':')?;
            let value = self.parse_field_value()?;
            fields.push((key, value));
            if self.check_punct(',') {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_punct('}')?;
        Ok(FieldValue::Object(fields))
    }

    fn parse_field_array(&mut self) -> Result<FieldValue, ParseError> {
        self.expect_punct('[')?;
        let mut items = Vec::new();
        loop {
            if self.check_punct(']') {
                break;
            }
            items.push(self.parse_field_value()?);
            if self.check_punct(',') {
                self.advance();
            } else {
                break;
            }
        }
        self.expect_punct(']')?;
        Ok(FieldValue::Array(items))
    }

    // ---- pat / pattern body ---------------------------------------------

    fn parse_pat_header(&mut self) -> Result<(String, Vec<SeqMod>), ParseError> {
        let (name, _) = self.expect_ident()?;
        let mut mods = Vec::new();
        while self.check_punct(':') {
            self.advance();
            mods.push(self.parse_seq_mod()?);
        }
        Ok((name, mods))
    }

    fn parse_pattern_body(&mut self) -> Result<Vec<PatItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            if self.at_top_level_boundary() {
                break;
            }
            if self.check_punct('(') {
                items.push(self.parse_group()?);
            } else {
                items.push(self.parse_pat_token()?);
            }
        }
        Ok(items)
    }

    fn parse_group(&mut self) -> Result<PatItem, ParseError> {
        let open = self.here();
        self.expect_punct('(')?;
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            if self.check_punct(')') {
                break;
            }
            if self.at_eof() {
                return Err(ParseError::spanning("unterminated group: missing ')'", open, self.here()));
            }
            if self.check_punct('(') {
                items.push(self.parse_group()?);
            } else {
                items.push(self.parse_pat_token()?);
            }
        }
        self.expect_punct(')')?;
        let repeat = self.parse_optional_repeat()?;
        Ok(PatItem::Group { items, repeat })
    }

    fn parse_pat_token(&mut self) -> Result<PatItem, ParseError> {
        if self.check_punct('.') {
            self.advance();
            let dur = self.parse_optional_duration()?;
            let effects = self.parse_inline_effects()?;
            let repeat = self.parse_optional_repeat()?;
            return Ok(PatItem::Tok { kind: PatTokenKind::Rest(dur), effects, repeat });
        }

        let (name, _) = self.expect_ident()?;
        if name == "inst" && self.check_punct('(') {
            self.advance();
            let (inst_name, _) = self.expect_ident_or_str()?;
            let mut count = None;
            if self.check_punct(',') {
                self.advance();
                count = Some(self.expect_int()? as u32);
            }
            self.expect_punct(')')?;
            let repeat = self.parse_optional_repeat()?;
            return Ok(PatItem::Tok {
                kind: PatTokenKind::InlineInst(inst_name, count),
                effects: Vec::new(),
                repeat,
            });
        }

        let dur = self.parse_optional_duration()?;
        let effects = self.parse_inline_effects()?;
        let repeat = self.parse_optional_repeat()?;
        let kind = if looks_like_note(&name) {
            PatTokenKind::Note(name, dur)
        } else {
            PatTokenKind::Named(name, dur)
        };
        Ok(PatItem::Tok { kind, effects, repeat })
    }

    fn parse_optional_duration(&mut self) -> Result<u32, ParseError> {
        if self.check_punct(':') {
            self.advance();
            Ok(self.expect_int()? as u32)
        } else {
            Ok(1)
        }
    }

    fn parse_optional_repeat(&mut self) -> Result<u32, ParseError> {
        if self.check_punct('*') {
            self.advance();
            Ok(self.expect_int()? as u32)
        } else {
            Ok(1)
        }
    }

    fn parse_inline_effects(&mut self) -> Result<Vec<EffectSpec>, ParseError> {
        let mut out = Vec::new();
        while self.check_punct('<') {
            self.advance();
            let (name, _) = self.expect_ident()?;
            self.expect_punct(':')?;
            let mut params = Vec::new();
            loop {
                params.push(self.parse_scalar_word()?);
                if self.check_punct(',') {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect_punct('>')?;
            out.push(EffectSpec { name, params });
        }
        Ok(out)
    }

    // ---- seq --------------------------------------------------------------

    fn parse_seq_body(&mut self) -> Result<Vec<SeqItem>, ParseError> {
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            if self.at_top_level_boundary() {
                break;
            }
            items.push(self.parse_seq_item()?);
        }
        Ok(items)
    }

    fn parse_seq_item(&mut self) -> Result<SeqItem, ParseError> {
        let (name, pos) = self.expect_ident()?;
        let mut mods = Vec::new();
        while self.check_punct(':') {
            self.advance();
            mods.push(self.parse_seq_mod()?);
        }
        let repeat = self.parse_optional_repeat()?;
        Ok(SeqItem { name, mods, repeat, pos })
    }

    fn parse_paren_int(&mut self, default: i32) -> Result<i32, ParseError> {
        if self.check_punct('(') {
            self.advance();
            let n = self.expect_int()? as i32;
            self.expect_punct(')')?;
            Ok(n)
        } else {
            Ok(default)
        }
    }

    fn parse_seq_mod(&mut self) -> Result<SeqMod, ParseError> {
        if let Some(Token { kind: TokKind::Int(n), .. }) = self.peek().cloned() {
            self.advance();
            return Ok(SeqMod::Transpose(n as i32));
        }

        let (name, pos) = self.expect_ident()?;
        match name.as_str() {
            "oct" => Ok(SeqMod::Oct(self.parse_paren_int(0)?)),
            "transpose" | "st" => Ok(SeqMod::Transpose(self.parse_paren_int(0)?)),
            "rev" => Ok(SeqMod::Rev),
            "slow" => Ok(SeqMod::Slow(self.parse_paren_int(2)?.max(1) as u32)),
            "fast" => Ok(SeqMod::Fast(self.parse_paren_int(2)?.max(1) as u32)),
            "inst" => {
                self.expect_punct('(')?;
                let (n, _) = self.expect_ident_or_str()?;
                self.expect_punct(')')?;
                Ok(SeqMod::Inst(n))
            }
            "pan" => {
                self.expect_punct('(')?;
                let (n, p) = self.expect_ident_or_str_or_num()?;
                self.expect_punct(')')?;
                let pan = Pan::parse(&n).ok_or_else(|| ParseError::at(format!("invalid pan value '{n}'"), p))?;
                Ok(SeqMod::Pan(pan))
            }
            "arp" => {
                self.expect_punct('(')?;
                let mut vals = Vec::new();
                loop {
                    vals.push(self.expect_int()? as i32);
                    if self.check_punct(',') {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect_punct(')')?;
                Ok(SeqMod::Arp(vals))
            }
            other => {
                let mut params = Vec::new();
                if self.check_punct('(') {
                    self.advance();
                    loop {
                        if self.check_punct(')') {
                            break;
                        }
                        params.push(self.parse_scalar_word()?);
                        if self.check_punct(',') {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    self.expect_punct(')')?;
                }
                let _ = pos;
                Ok(SeqMod::Unknown(other.to_string(), params))
            }
        }
    }

    fn expect_ident_or_str_or_num(&mut self) -> Result<(String, Position), ParseError> {
        match self.peek().cloned() {
            Some(Token { kind: TokKind::Int(n), start, .. }) => {
                self.advance();
                Ok((n.to_string(), start))
            }
            Some(Token { kind: TokKind::Float(n), start, .. }) => {
                self.advance();
                Ok((n.to_string(), start))
            }
            _ => self.expect_ident_or_str(),
        }
    }

    // ---- channel ------------------------------------------------------------

    fn parse_channel(&mut self) -> Result<ChannelBinding, ParseError> {
        let id = self.expect_int()? as u8;
        self.expect_arrow()?;
        let mut default_instrument = None;
        let mut sequence_ref = None;
        let mut pattern_ref = None;
        let mut speed = 1.0;
        let mut pan = None;
        loop {
            match self.peek_ident_text() {
                Some("inst") => {
                    self.advance();
                    let (n, _) = self.expect_ident_or_str()?;
                    default_instrument = Some(n);
                }
                Some("seq") => {
                    self.advance();
                    let (n, _) = self.expect_ident_or_str()?;
                    sequence_ref = Some(n);
                }
                Some("pat") => {
                    self.advance();
                    let (n, _) = self.expect_ident_or_str()?;
                    pattern_ref = Some(n);
                }
                Some("speed") => {
                    self.advance();
                    self.expect_punct('=')?;
                    speed = self.expect_number()?;
                }
                Some("pan") => {
                    self.advance();
                    self.expect_punct('=')?;
                    let (v, p) = self.expect_ident_or_str_or_num()?;
                    pan = Some(Pan::parse(&v).ok_or_else(|| ParseError::at(format!("invalid pan value '{v}'"), p))?);
                }
                _ => break,
            }
        }
        Ok(ChannelBinding {
            id,
            default_instrument,
            sequence_ref,
            pattern_ref,
            speed,
            pan,
        })
    }
}

/// Normalize a declared wave table to exactly 16 nibbles: truncate if
/// longer (trackers commonly author 32-sample GB wave RAM; this engine's
/// wavetable channel loops over a fixed 16-sample buffer), pad with zero
/// if shorter.
fn normalize_wave_table(values: &[FieldValue]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for (i, slot) in out.iter_mut().enumerate() {
        if let Some(v) = values.get(i).and_then(FieldValue::as_num) {
            *slot = (v.round().clamp(0.0, 15.0)) as u8;
        }
    }
    out
}

fn build_envelope(value: &FieldValue) -> Option<Envelope> {
    match value {
        FieldValue::Gb(parts) if parts.len() >= 3 => Some(Envelope::Gb {
            initial: parts[0].parse().ok()?,
            direction: direction_from_str(&parts[1])?,
            period: parts[2].parse().ok()?,
        }),
        FieldValue::Object(fields) => {
            let get = |k: &str| fields.iter().find(|(key, _)| key == k).map(|(_, v)| v);
            if let (Some(initial), Some(direction), Some(period)) = (get("initial"), get("direction"), get("period")) {
                Some(Envelope::Gb {
                    initial: initial.as_num()? as u8,
                    direction: direction_from_str(direction.as_text()?)?,
                    period: period.as_num()? as u8,
                })
            } else if let (Some(a), Some(d), Some(s), Some(r)) =
                (get("attack"), get("decay"), get("sustain"), get("release"))
            {
                Some(Envelope::Adsr {
                    attack: a.as_num()?,
                    decay: d.as_num()?,
                    sustain: s.as_num()?,
                    release: r.as_num()?,
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

fn build_sweep(value: &FieldValue) -> Option<Sweep> {
    match value {
        FieldValue::Gb(parts) if parts.len() >= 3 => Some(Sweep {
            time: parts[0].parse().ok()?,
            direction: direction_from_str(&parts[1])?,
            shift: parts[2].parse().ok()?,
        }),
        FieldValue::Object(fields) => {
            let get = |k: &str| fields.iter().find(|(key, _)| key == k).map(|(_, v)| v);
            Some(Sweep {
                time: get("time")?.as_num()? as u8,
                direction: direction_from_str(get("direction")?.as_text()?)?,
                shift: get("shift")?.as_num()? as u8,
            })
        }
        _ => None,
    }
}

fn build_noise(value: &FieldValue) -> Option<NoiseParams> {
    let mut params = NoiseParams::default();
    match value {
        FieldValue::Gb(parts) => {
            if let Some(w) = parts.first().and_then(|p| p.parse().ok()) {
                params.width = w;
            }
            if let Some(d) = parts.get(1).and_then(|p| p.parse().ok()) {
                params.divisor = d;
            }
            if let Some(s) = parts.get(2).and_then(|p| p.parse().ok()) {
                params.shift = s;
            }
            Some(params)
        }
        FieldValue::Object(fields) => {
            for (k, v) in fields {
                match k.as_str() {
                    "width" => params.width = v.as_num()? as u8,
                    "divisor" => params.divisor = v.as_num()? as u32,
                    "shift" => params.shift = v.as_num()? as u32,
                    _ => {}
                }
            }
            Some(params)
        }
        _ => None,
    }
}

fn build_instrument(name: String, pos: Position, fields: Vec<(String, FieldValue)>) -> Result<Instrument, ParseError> {
    let mut inst = Instrument {
        name: name.clone(),
        kind: InstrumentType::Pulse1,
        duty: None,
        envelope: Envelope::default(),
        sweep: None,
        wave_table: None,
        noise: None,
        pan: None,
        default_note: None,
        extra: HashMap::new(),
    };
    let mut kind_set = false;

    for (key, value) in fields {
        match key.as_str() {
            "type" => {
                let text = value.as_text().unwrap_or_default();
                inst.kind = InstrumentType::parse(text)
                    .ok_or_else(|| ParseError::at(format!("instrument '{name}': unknown type '{text}'"), pos))?;
                kind_set = true;
            }
            "duty" => inst.duty = value.as_num(),
            "env" => inst.envelope = build_envelope(&value).unwrap_or(inst.envelope),
            "sweep" => inst.sweep = build_sweep(&value),
            "wave" => {
                if let Some(items) = value.array_items() {
                    inst.wave_table = Some(normalize_wave_table(items));
                }
            }
            "noise" => inst.noise = build_noise(&value),
            "pan" => inst.pan = value.as_text().and_then(Pan::parse),
            "note" => inst.default_note = value.as_text().map(|s| s.to_string()),
            _ => {
                inst.extra.insert(key, value.render());
            }
        }
    }

    if !kind_set {
        if inst.wave_table.is_some() {
            inst.kind = InstrumentType::Wave;
        } else if inst.noise.is_some() {
            inst.kind = InstrumentType::Noise;
        }
    }

    inst.validate().map_err(|msg| ParseError::at(msg, pos))?;
    Ok(inst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PatTokenKind;

    #[test]
    fn parses_top_level_song_settings() {
        let song = parse("chip gameboy\nbpm 140\ntime 3\nstepsPerBar 12\nticksPerStep 2").unwrap();
        assert_eq!(song.chip.as_deref(), Some("gameboy"));
        assert_eq!(song.bpm, 140.0);
        assert_eq!(song.time, 3.0);
        assert_eq!(song.steps_per_bar, 12);
        assert_eq!(song.ticks_per_step, 2);
    }

    #[test]
    fn parses_instrument_with_gb_envelope_and_sweep() {
        let song = parse("inst lead type=pulse1 duty=50 env=gb:12,down,2 sweep=gb:4,up,1").unwrap();
        let inst = song.insts.get("lead").unwrap();
        assert_eq!(inst.kind, InstrumentType::Pulse1);
        assert_eq!(inst.duty, Some(50.0));
        assert_eq!(
            inst.envelope,
            Envelope::Gb { initial: 12, direction: Direction::Down, period: 2 }
        );
        assert_eq!(inst.sweep, Some(Sweep { time: 4, direction: Direction::Up, shift: 1 }));
    }

    #[test]
    fn parses_wave_instrument_and_normalizes_table() {
        let song = parse("inst organ type=wave wave=[0,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15]").unwrap();
        let inst = song.insts.get("organ").unwrap();
        assert_eq!(inst.wave_table.unwrap()[0], 0);
        assert_eq!(inst.wave_table.unwrap()[15], 15);
    }

    #[test]
    fn truncates_oversized_wave_table_to_chip_width() {
        let values: Vec<String> = (0..32).map(|i| (i % 16).to_string()).collect();
        let src = format!("inst organ type=wave wave=[{}]", values.join(","));
        let song = parse(&src).unwrap();
        let table = song.insts.get("organ").unwrap().wave_table.unwrap();
        assert_eq!(table.len(), 16);
        assert_eq!(table[0], 0);
    }

    #[test]
    fn parses_pattern_body_with_repeat_group_and_effects() {
        let song = parse("pat mel = C4*2 (D4 .)*3 kick<pan:L,0.2>").unwrap();
        let body = song.pats.get("mel").unwrap();
        assert_eq!(body.len(), 3);
        match &body[0] {
            PatItem::Tok { kind: PatTokenKind::Note(n, dur), repeat, .. } => {
                assert_eq!(n, "C4");
                assert_eq!(*dur, 1);
                assert_eq!(*repeat, 2);
            }
            other => panic!("unexpected item {other:?}"),
        }
        match &body[1] {
            PatItem::Group { items, repeat } => {
                assert_eq!(items.len(), 2);
                assert_eq!(*repeat, 3);
            }
            other => panic!("unexpected item {other:?}"),
        }
        match &body[2] {
            PatItem::Tok { kind: PatTokenKind::Named(n, _), effects, .. } => {
                assert_eq!(n, "kick");
                assert_eq!(effects.len(), 1);
                assert_eq!(effects[0].name, "pan");
                assert_eq!(effects[0].params, vec!["L".to_string(), "0.2".to_string()]);
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn parses_inline_instrument_switch() {
        let song = parse("pat p = inst(snare) C4 inst(kick,2) D4").unwrap();
        let body = song.pats.get("p").unwrap();
        match &body[0] {
            PatItem::Tok { kind: PatTokenKind::InlineInst(name, count), .. } => {
                assert_eq!(name, "snare");
                assert_eq!(*count, None);
            }
            other => panic!("unexpected item {other:?}"),
        }
        match &body[2] {
            PatItem::Tok { kind: PatTokenKind::InlineInst(name, count), .. } => {
                assert_eq!(name, "kick");
                assert_eq!(*count, Some(2));
            }
            other => panic!("unexpected item {other:?}"),
        }
    }

    #[test]
    fn parses_sequence_with_mods_and_unknown_transform_survives() {
        let song = parse("seq main = verseA:oct(1):rev*2 chorus:swing(3)").unwrap();
        let items = song.seqs.get("main").unwrap();
        assert_eq!(items[0].name, "verseA");
        assert_eq!(items[0].mods, vec![SeqMod::Oct(1), SeqMod::Rev]);
        assert_eq!(items[0].repeat, 2);
        assert_eq!(items[1].mods, vec![SeqMod::Unknown("swing".to_string(), vec!["3".to_string()])]);
    }

    #[test]
    fn parses_channel_binding() {
        let song = parse("channel 1 => inst lead seq main speed=0.5 pan=L").unwrap();
        let ch = &song.channels[0];
        assert_eq!(ch.id, 1);
        assert_eq!(ch.default_instrument.as_deref(), Some("lead"));
        assert_eq!(ch.sequence_ref.as_deref(), Some("main"));
        assert_eq!(ch.speed, 0.5);
        assert_eq!(ch.pan, Some(Pan::Left));
    }

    #[test]
    fn pattern_def_modifiers_are_captured_separately_from_body() {
        let song = parse("pat mel:rev = C4 D4 E4").unwrap();
        assert_eq!(song.pats.get("mel").unwrap().len(), 3);
        assert_eq!(song.pat_mods.get("mel").unwrap(), &vec![SeqMod::Rev]);
    }

    #[test]
    fn rejects_unknown_top_level_keyword() {
        let err = parse("frobnicate 1").unwrap_err();
        assert!(err.message.contains("unknown top-level keyword"));
    }

    #[test]
    fn rejects_unterminated_group() {
        let err = parse("pat p = (C4 D4").unwrap_err();
        assert!(err.message.contains("unterminated group"));
    }

    #[test]
    fn parses_import_and_export_and_play() {
        let song = parse("import \"std:drums\"\nplay repeat\nexport wav \"out.wav\"").unwrap();
        assert_eq!(song.imports[0].url, "std:drums");
        assert!(song.play.unwrap().repeat);
        assert_eq!(song.exports[0].format, "wav");
        assert_eq!(song.exports[0].path, "out.wav");
    }
}
