//! Pattern Expander.
//!
//! Flattens a parsed pattern body — collapsing `tok*N` repetition and
//! `(...)*N` grouping into a single linear token list — and applies
//! sequence-style transforms (`SeqMod`) to that list. The same transform
//! machinery is reused by the pattern-definition modifier stage (`pat
//! X:rev = ...`) and by the Sequence Expander for `seq`-level modifiers,
//! since both operate over the same flattened token shape.
//!
//! Every flattened token is tagged with the name of the pattern it came
//! from (`ExpandedTok::source_pattern`), threaded through every transform
//! below so the Resolver can stamp `sourcePattern` onto ISM events (spec
//! §9 "Inline effect attachment" makes the same demand of effects: source
//! association must survive every transform).

use crate::ast::{EffectSpec, Pan, PatItem, PatTokenKind, SeqMod};
use crate::error::ResolveWarning;
use crate::notes::{midi_to_note, note_to_midi};

/// A single flattened pattern token with its originating pattern name.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedTok {
    /// The token payload; always `PatItem::Tok` with `repeat == 1` after
    /// expansion (`Group` never survives this stage).
    pub item: PatItem,
    /// Name of the pattern this token was expanded from, if any.
    pub source_pattern: Option<String>,
}

/// Flatten repeats and groups into a single ordered list of tagged
/// leaf tokens.
pub fn expand_pattern_body(body: &[PatItem], source_pattern: Option<&str>) -> Vec<ExpandedTok> {
    let mut out = Vec::new();
    expand_into(body, source_pattern, &mut out);
    out
}

fn expand_into(body: &[PatItem], source_pattern: Option<&str>, out: &mut Vec<ExpandedTok>) {
    for item in body {
        match item {
            PatItem::Tok { kind, effects, repeat } => {
                for _ in 0..(*repeat).max(1) {
                    out.push(ExpandedTok {
                        item: PatItem::Tok { kind: kind.clone(), effects: effects.clone(), repeat: 1 },
                        source_pattern: source_pattern.map(str::to_string),
                    });
                }
            }
            PatItem::Group { items, repeat } => {
                let mut inner = Vec::new();
                expand_into(items, source_pattern, &mut inner);
                for _ in 0..(*repeat).max(1) {
                    out.extend(inner.clone());
                }
            }
        }
    }
}

/// Apply a chain of transforms to a flattened token list, left to right.
/// Unknown transforms are a no-op on the token stream and a warning in
/// `warnings`; they never abort resolution.
pub fn apply_mods(tokens: Vec<ExpandedTok>, mods: &[SeqMod], component: &str, warnings: &mut Vec<ResolveWarning>) -> Vec<ExpandedTok> {
    let mut toks = tokens;
    for m in mods {
        toks = apply_one(toks, m, component, warnings);
    }
    toks
}

fn apply_one(tokens: Vec<ExpandedTok>, m: &SeqMod, component: &str, warnings: &mut Vec<ResolveWarning>) -> Vec<ExpandedTok> {
    match m {
        SeqMod::Oct(k) => transpose_notes(tokens, k * 12),
        SeqMod::Transpose(k) => transpose_notes(tokens, *k),
        SeqMod::Rev => {
            let mut v = tokens;
            v.reverse();
            v
        }
        SeqMod::Slow(k) => {
            let mut out = Vec::with_capacity(tokens.len() * (*k as usize));
            for tok in tokens {
                for _ in 0..(*k).max(1) {
                    out.push(tok.clone());
                }
            }
            out
        }
        SeqMod::Fast(k) => tokens.into_iter().step_by((*k).max(1) as usize).collect(),
        SeqMod::Inst(name) => {
            let mut out = vec![ExpandedTok {
                item: PatItem::Tok { kind: PatTokenKind::InlineInst(name.clone(), None), effects: Vec::new(), repeat: 1 },
                source_pattern: None,
            }];
            out.extend(tokens);
            out
        }
        SeqMod::Pan(pan) => {
            let mut out = vec![ExpandedTok {
                item: PatItem::Tok { kind: PatTokenKind::Rest(0), effects: vec![pan_effect(pan)], repeat: 1 },
                source_pattern: None,
            }];
            out.extend(tokens);
            out
        }
        SeqMod::Arp(offsets) => arpeggiate(tokens, offsets),
        SeqMod::Unknown(name, _) => {
            warnings.push(ResolveWarning::new(component, format!("unknown transform '{name}'")));
            tokens
        }
    }
}

fn pan_effect(pan: &Pan) -> EffectSpec {
    EffectSpec {
        name: "pan".to_string(),
        params: vec![pan.as_value().to_string()],
    }
}

fn transpose_notes(tokens: Vec<ExpandedTok>, semitones: i32) -> Vec<ExpandedTok> {
    tokens
        .into_iter()
        .map(|tok| match tok.item {
            PatItem::Tok { kind: PatTokenKind::Note(name, dur), effects, repeat } => {
                let shifted = note_to_midi(&name)
                    .map(|p| midi_to_note((p + semitones).clamp(0, 127)))
                    .unwrap_or(name);
                ExpandedTok {
                    item: PatItem::Tok { kind: PatTokenKind::Note(shifted, dur), effects, repeat },
                    source_pattern: tok.source_pattern,
                }
            }
            other => ExpandedTok { item: other, source_pattern: tok.source_pattern },
        })
        .collect()
}

fn arpeggiate(tokens: Vec<ExpandedTok>, offsets: &[i32]) -> Vec<ExpandedTok> {
    if offsets.is_empty() {
        return tokens;
    }
    let mut out = Vec::new();
    for tok in tokens {
        match tok.item {
            PatItem::Tok { kind: PatTokenKind::Note(name, dur), effects, .. } => {
                let split_dur = (dur / offsets.len() as u32).max(1);
                let Some(base) = note_to_midi(&name) else {
                    out.push(ExpandedTok {
                        item: PatItem::Tok { kind: PatTokenKind::Note(name, dur), effects, repeat: 1 },
                        source_pattern: tok.source_pattern,
                    });
                    continue;
                };
                for offset in offsets {
                    out.push(ExpandedTok {
                        item: PatItem::Tok {
                            kind: PatTokenKind::Note(midi_to_note((base + offset).clamp(0, 127)), split_dur),
                            effects: effects.clone(),
                            repeat: 1,
                        },
                        source_pattern: tok.source_pattern.clone(),
                    });
                }
            }
            other => out.push(ExpandedTok { item: other, source_pattern: tok.source_pattern }),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(name: &str) -> ExpandedTok {
        ExpandedTok {
            item: PatItem::Tok { kind: PatTokenKind::Note(name.to_string(), 1), effects: Vec::new(), repeat: 1 },
            source_pattern: Some("p".to_string()),
        }
    }

    #[test]
    fn expands_repeat_and_group_and_tags_source_pattern() {
        let body = vec![
            PatItem::Tok { kind: PatTokenKind::Note("C4".into(), 1), effects: Vec::new(), repeat: 2 },
            PatItem::Group {
                items: vec![PatItem::Tok { kind: PatTokenKind::Rest(1), effects: Vec::new(), repeat: 1 }],
                repeat: 3,
            },
        ];
        let expanded = expand_pattern_body(&body, Some("mel"));
        assert_eq!(expanded.len(), 5);
        assert!(expanded.iter().all(|t| t.source_pattern.as_deref() == Some("mel")));
    }

    #[test]
    fn oct_transposes_by_twelve_semitones() {
        let toks = vec![note("C4")];
        let mut warnings = Vec::new();
        let out = apply_mods(toks, &[SeqMod::Oct(1)], "test", &mut warnings);
        match &out[0].item {
            PatItem::Tok { kind: PatTokenKind::Note(n, _), .. } => assert_eq!(n, "C5"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(out[0].source_pattern.as_deref(), Some("p"));
        assert!(warnings.is_empty());
    }

    #[test]
    fn rev_reverses_order() {
        let toks = vec![note("C4"), note("D4")];
        let mut warnings = Vec::new();
        let out = apply_mods(toks, &[SeqMod::Rev], "test", &mut warnings);
        match (&out[0].item, &out[1].item) {
            (PatItem::Tok { kind: PatTokenKind::Note(a, _), .. }, PatItem::Tok { kind: PatTokenKind::Note(b, _), .. }) => {
                assert_eq!(a, "D4");
                assert_eq!(b, "C4");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn arp_splits_duration_across_offsets() {
        let toks = vec![ExpandedTok {
            item: PatItem::Tok { kind: PatTokenKind::Note("C4".into(), 4), effects: Vec::new(), repeat: 1 },
            source_pattern: Some("p".to_string()),
        }];
        let mut warnings = Vec::new();
        let out = apply_mods(toks, &[SeqMod::Arp(vec![0, 4, 7])], "test", &mut warnings);
        assert_eq!(out.len(), 3);
        for tok in &out {
            match &tok.item {
                PatItem::Tok { kind: PatTokenKind::Note(_, dur), .. } => assert_eq!(*dur, 1),
                other => panic!("unexpected {other:?}"),
            }
            assert_eq!(tok.source_pattern.as_deref(), Some("p"));
        }
    }

    #[test]
    fn unknown_transform_is_a_no_op_with_warning() {
        let toks = vec![note("C4")];
        let mut warnings = Vec::new();
        let out = apply_mods(toks, &[SeqMod::Unknown("swing".into(), vec!["3".into()])], "pattern-expander", &mut warnings);
        assert_eq!(out.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("swing"));
    }

    #[test]
    fn pan_mod_prepends_zero_duration_marker() {
        let toks = vec![note("C4")];
        let mut warnings = Vec::new();
        let out = apply_mods(toks, &[SeqMod::Pan(Pan::Left)], "test", &mut warnings);
        assert_eq!(out.len(), 2);
        match &out[0].item {
            PatItem::Tok { kind: PatTokenKind::Rest(0), effects, .. } => {
                assert_eq!(effects[0].name, "pan");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
