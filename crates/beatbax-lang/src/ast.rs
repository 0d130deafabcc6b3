//! The parsed Abstract Syntax Tree.
//!
//! Owned entirely by the parse call; consumed by the resolver and not
//! retained past resolution.

use std::collections::HashMap;

use crate::error::Position;

/// Pitch-bend/volume direction used by envelopes and sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    /// Volume/frequency moves upward over time.
    Up,
    /// Volume/frequency moves downward over time.
    Down,
}

/// Stereo placement.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Pan {
    /// Hard left.
    Left,
    /// Centered.
    Center,
    /// Hard right.
    Right,
    /// Arbitrary value in `-1.0..=1.0`.
    Value(f64),
}

impl Pan {
    /// Parse a pan token such as `L`, `C`, `R`, or a bare number.
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_uppercase().as_str() {
            "L" | "LEFT" => Some(Pan::Left),
            "C" | "CENTER" | "CENTRE" => Some(Pan::Center),
            "R" | "RIGHT" => Some(Pan::Right),
            _ => text.parse::<f64>().ok().map(Pan::Value),
        }
    }

    /// Numeric value in `-1.0..=1.0`, matching a `StereoPannerNode.pan`.
    pub fn as_value(&self) -> f64 {
        match self {
            Pan::Left => -1.0,
            Pan::Center => 0.0,
            Pan::Right => 1.0,
            Pan::Value(v) => v.clamp(-1.0, 1.0),
        }
    }
}

/// The kind of sound generator an instrument targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum InstrumentType {
    /// Square/pulse channel 1 (with sweep).
    Pulse1,
    /// Square/pulse channel 2 (no sweep).
    Pulse2,
    /// 4-bit wavetable channel.
    Wave,
    /// LFSR noise channel.
    Noise,
}

impl InstrumentType {
    /// Parse from the `type=` instrument field value.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "pulse1" => Some(InstrumentType::Pulse1),
            "pulse2" => Some(InstrumentType::Pulse2),
            "wave" => Some(InstrumentType::Wave),
            "noise" => Some(InstrumentType::Noise),
            _ => None,
        }
    }

    /// The channel id (1..4) this instrument type naturally targets.
    pub fn default_channel(&self) -> u8 {
        match self {
            InstrumentType::Pulse1 => 1,
            InstrumentType::Pulse2 => 2,
            InstrumentType::Wave => 3,
            InstrumentType::Noise => 4,
        }
    }
}

/// A Game Boy hardware envelope or a legacy ADSR envelope.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Envelope {
    /// Game Boy form: `{initial, direction, period}`.
    Gb {
        /// Initial volume, 0..=15.
        initial: u8,
        /// Whether volume steps up or down.
        direction: Direction,
        /// Step period in envelope frames (0 = disabled, falls back to ADSR).
        period: u8,
    },
    /// Legacy ADSR envelope, used when `period == 0`.
    Adsr {
        /// Attack time in seconds.
        attack: f64,
        /// Decay time in seconds.
        decay: f64,
        /// Sustain level, 0.0..=1.0.
        sustain: f64,
        /// Release time in seconds.
        release: f64,
    },
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope::Gb {
            initial: 15,
            direction: Direction::Down,
            period: 0,
        }
    }
}

/// A pulse-channel frequency sweep (channel 1 only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Sweep {
    /// Sweep time, 0..=7 (in units of 1/128s).
    pub time: u8,
    /// Sweep direction.
    pub direction: Direction,
    /// Shift amount, 0..=7.
    pub shift: u8,
}

/// Noise-channel LFSR configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NoiseParams {
    /// LFSR width: 15 or 7 bits.
    pub width: u8,
    /// Clock divisor (hardware `r` field).
    pub divisor: u32,
    /// Clock shift (hardware `s` field).
    pub shift: u32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            width: 15,
            divisor: 1,
            shift: 0,
        }
    }
}

/// A fully parsed instrument definition.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Instrument {
    /// Instrument name (map key, duplicated here for convenience).
    pub name: String,
    /// Generator kind.
    pub kind: InstrumentType,
    /// Duty cycle, only meaningful for pulse instruments. One of
    /// `{12.5, 25, 50, 75}`.
    pub duty: Option<f64>,
    /// Volume/amplitude envelope.
    pub envelope: Envelope,
    /// Optional frequency sweep (pulse1 only).
    pub sweep: Option<Sweep>,
    /// 16 nibbles (0..=15), normalized from the declared table.
    pub wave_table: Option<[u8; 16]>,
    /// Noise-channel LFSR parameters.
    pub noise: Option<NoiseParams>,
    /// Default stereo placement.
    pub pan: Option<Pan>,
    /// Default note for named (percussion) triggers.
    pub default_note: Option<String>,
    /// Any other `key=value` fields not interpreted above, preserved for
    /// forward compatibility and export sinks.
    pub extra: HashMap<String, String>,
}

impl Instrument {
    /// Validate the cross-field invariants an instrument definition must
    /// satisfy (e.g. duty cycle only applies to pulse channels).
    pub fn validate(&self) -> Result<(), String> {
        if self.kind == InstrumentType::Pulse1 || self.kind == InstrumentType::Pulse2 {
            if let Some(duty) = self.duty {
                if ![12.5, 25.0, 50.0, 75.0].contains(&duty) {
                    return Err(format!(
                        "instrument '{}': duty {duty} is not one of 12.5, 25, 50, 75",
                        self.name
                    ));
                }
            }
        }
        if self.kind == InstrumentType::Wave {
            if let Some(table) = &self.wave_table {
                if table.len() != 16 {
                    return Err(format!("instrument '{}': wave table must normalize to 16 entries", self.name));
                }
            }
        }
        if let Some(noise) = &self.noise {
            if noise.width != 7 && noise.width != 15 {
                return Err(format!("instrument '{}': noise width must be 7 or 15", self.name));
            }
        }
        Ok(())
    }
}

/// A token inside a pattern body, before the Pattern Expander flattens
/// repetition and grouping.
#[derive(Debug, Clone, PartialEq)]
pub enum PatItem {
    /// A leaf token (note, rest, or named trigger), with its repeat count
    /// (`tok*N`) and attached inline effects.
    Tok {
        /// The token payload.
        kind: PatTokenKind,
        /// Inline effects (`<fx:p1,p2>`), attached in source order.
        effects: Vec<EffectSpec>,
        /// Repeat count from `tok*N` syntax (default 1).
        repeat: u32,
    },
    /// A parenthesized group with a repeat count: `( a b c )*N`.
    Group {
        /// Items inside the group.
        items: Vec<PatItem>,
        /// Repeat count (default 1).
        repeat: u32,
    },
}

/// The payload of a single pattern leaf token.
#[derive(Debug, Clone, PartialEq)]
pub enum PatTokenKind {
    /// A pitched note, e.g. `C4`, with an optional duration multiplier
    /// from `tok:n` syntax (default 1).
    Note(String, u32),
    /// `.` — a rest, with an optional duration multiplier.
    Rest(u32),
    /// An identifier that resolves to an instrument at playback
    /// (percussion/noise trigger), with an optional duration multiplier.
    Named(String, u32),
    /// `inst(name)` or `inst(name,N)` — switches or temporarily overrides
    /// the running default instrument.
    InlineInst(String, Option<u32>),
}

/// A single effect attached to a token: `<fx:p1,p2,...>`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EffectSpec {
    /// Effect handler name (`pan`, `vib`, `port`, `arp`, `volSlide`,
    /// `trem`, `echo`, `retrig`, `sweep`, ...).
    pub name: String,
    /// Raw comma-separated parameters, unparsed (handlers interpret
    /// their own parameter shape).
    pub params: Vec<String>,
}

/// A sequence-level transform applied to a referenced pattern/sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum SeqMod {
    /// `oct(±k)` — shift every note's octave.
    Oct(i32),
    /// `transpose(±k)` / `±k` / `st(±k)` — shift semitones.
    Transpose(i32),
    /// `rev` — reverse the token list.
    Rev,
    /// `slow[(k)]` — repeat each token k times (default 2).
    Slow(u32),
    /// `fast[(k)]` — keep every k-th token (default 2).
    Fast(u32),
    /// `inst(name)` — prepend an instrument-switch directive.
    Inst(String),
    /// `pan(side|value)` — prepend a pan directive.
    Pan(Pan),
    /// `arp(a,b,c,...)` — expand into an arpeggio over semitone offsets.
    Arp(Vec<i32>),
    /// An unrecognized transform name. Parsing never fails on this (spec
    /// §4.5: unknown transforms are a resolver *warning*, not a parse
    /// error); it is carried through and reported, then ignored, by the
    /// Sequence Expander.
    Unknown(String, Vec<String>),
}

/// One item in a `seq` body: a reference to a pattern or another
/// sequence, with modifiers and a repeat count.
#[derive(Debug, Clone, PartialEq)]
pub struct SeqItem {
    /// Name of the referenced pattern or sequence.
    pub name: String,
    /// Transforms applied left to right.
    pub mods: Vec<SeqMod>,
    /// Repeat count from `name*N` syntax (default 1).
    pub repeat: u32,
    /// Source position, for cycle-detection error messages.
    pub pos: Position,
}

/// A `channel N => inst I seq S [speed=x]` binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBinding {
    /// Channel id, 1..=4.
    pub id: u8,
    /// Default instrument name for this channel.
    pub default_instrument: Option<String>,
    /// Referenced sequence name (`seq S`).
    pub sequence_ref: Option<String>,
    /// Referenced pattern name (`pat P`), treated as a single-item
    /// sequence when no `seq` is given.
    pub pattern_ref: Option<String>,
    /// Playback speed multiplier (default 1.0).
    pub speed: f64,
    /// Channel-level default pan, used when no event/sequence pan wins.
    pub pan: Option<Pan>,
}

/// `import "<scheme:path>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    /// The raw URL as written in source.
    pub url: String,
    /// Source position, for error reporting.
    pub pos: Position,
}

/// `play [repeat]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayDirective {
    /// Whether playback should loop.
    pub repeat: bool,
}

/// `export <format> "<path>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDirective {
    /// Target export format (`json`, `midi`, `uge`, `wav`).
    pub format: String,
    /// Output path.
    pub path: String,
}

/// The complete parsed song.
#[derive(Debug, Clone, Default)]
pub struct Song {
    /// `chip <id>`.
    pub chip: Option<String>,
    /// `bpm <num>`.
    pub bpm: f64,
    /// `time <num>` (time-signature numerator; independent of the fixed
    /// stepsPerBeat=4 tick-grid divisor).
    pub time: f64,
    /// `stepsPerBar`.
    pub steps_per_bar: u32,
    /// `ticksPerStep`.
    pub ticks_per_step: u32,
    /// Instrument definitions by name.
    pub insts: HashMap<String, Instrument>,
    /// Pattern bodies by name, pre-expansion.
    pub pats: HashMap<String, Vec<PatItem>>,
    /// Pattern-definition modifiers (`pat X:rev = ...`), applied after the
    /// pattern expander flattens `pats[name]`.
    pub pat_mods: HashMap<String, Vec<SeqMod>>,
    /// Sequence bodies by name.
    pub seqs: HashMap<String, Vec<SeqItem>>,
    /// Channel bindings, in declaration order.
    pub channels: Vec<ChannelBinding>,
    /// Import directives, in declaration order.
    pub imports: Vec<ImportDecl>,
    /// `play` directive, if present.
    pub play: Option<PlayDirective>,
    /// `export` directives, in declaration order.
    pub exports: Vec<ExportDirective>,
}

impl Song {
    /// A new song with spec-default tempo/grid settings.
    pub fn new() -> Self {
        Self {
            bpm: 120.0,
            time: 4.0,
            steps_per_bar: 16,
            ticks_per_step: 1,
            ..Default::default()
        }
    }
}
