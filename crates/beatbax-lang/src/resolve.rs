//! The Resolver: AST → Internal Song Model.
//!
//! Walks each channel's expanded token stream once, tracking the running
//! default instrument, any temporary `inst(name,N)` override, and the
//! currently active pan, converting step-based token durations into
//! absolute tick counts along the way. Unknown references and transforms
//! never abort resolution — they're collected as [`ResolveWarning`]s and
//! the walk continues with a best-effort fallback.
//!
//! A temporary override (`inst(name,N)`) that runs off the end of the
//! token stream before consuming all `N` slots fires its remaining count
//! as immediate named hits rather than being silently dropped.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Pan, PatItem, PatTokenKind, Song};
use crate::error::{ResolveError, ResolveWarning};
use crate::ism::{ChannelEvents, Ism, IsmEvent, IsmEventKind};
use crate::notes::note_to_midi;
use crate::pattern::ExpandedTok;
use crate::sequence::expand_reference;

const COMPONENT: &str = "resolver";

/// Fixed subdivision of a beat every channel's tick grid is built from,
/// independent of the song's nominal `time` signature numerator.
const STEPS_PER_BEAT: f64 = 4.0;

/// Resolve a parsed [`Song`] into an [`Ism`], returning any non-fatal
/// findings alongside it.
pub fn resolve(song: &Song) -> Result<(Ism, Vec<ResolveWarning>), ResolveError> {
    let mut warnings = Vec::new();
    let instruments: HashMap<String, Arc<_>> = song.insts.iter().map(|(k, v)| (k.clone(), Arc::new(v.clone()))).collect();

    let seconds_per_step = (60.0 / song.bpm.max(1e-6)) / STEPS_PER_BEAT;
    let seconds_per_tick = seconds_per_step / song.ticks_per_step.max(1) as f64;
    let ticks_per_bar = (song.steps_per_bar.max(1) * song.ticks_per_step.max(1)) as u64;

    let mut channels = Vec::new();
    for binding in &song.channels {
        let (source_sequence, tokens) = if let Some(seq_name) = &binding.sequence_ref {
            (Some(seq_name.clone()), expand_reference(song, seq_name, &mut warnings)?)
        } else if let Some(pat_name) = &binding.pattern_ref {
            (Some(pat_name.clone()), expand_reference(song, pat_name, &mut warnings)?)
        } else {
            warnings.push(ResolveWarning::new(
                COMPONENT,
                format!("channel {} has no sequence or pattern bound", binding.id),
            ));
            (None, Vec::new())
        };

        let events = resolve_channel(
            binding.default_instrument.as_deref(),
            binding.speed,
            binding.pan,
            &source_sequence,
            &tokens,
            ticks_per_bar,
            &instruments,
            &mut warnings,
        );

        channels.push(ChannelEvents {
            channel: binding.id,
            events,
            seconds_per_tick,
        });
    }

    Ok((
        Ism {
            tempo_bpm: song.bpm,
            channels,
            instruments,
        },
        warnings,
    ))
}

struct Override {
    name: String,
    remaining: u32,
    previous: Option<String>,
}

#[allow(clippy::too_many_arguments)]
fn resolve_channel(
    channel_default_inst: Option<&str>,
    speed: f64,
    channel_pan: Option<Pan>,
    source_sequence: &Option<String>,
    tokens: &[ExpandedTok],
    ticks_per_bar: u64,
    instruments: &HashMap<String, Arc<crate::ast::Instrument>>,
    warnings: &mut Vec<ResolveWarning>,
) -> Vec<IsmEvent> {
    let mut running_instrument = channel_default_inst.map(|s| s.to_string());
    let mut running_pan: Option<Pan> = None;
    let mut override_frame: Option<Override> = None;
    let mut cumulative_ticks: u64 = 0;
    let mut event_index: u32 = 0;
    let mut out = Vec::new();
    let speed = if speed > 0.0 { speed } else { 1.0 };

    let check_known_instrument = |name: &str, warnings: &mut Vec<ResolveWarning>| {
        if !instruments.contains_key(name) {
            warnings.push(ResolveWarning::new(COMPONENT, format!("unknown instrument reference '{name}'")));
        }
    };

    if let Some(name) = &running_instrument {
        check_known_instrument(name, warnings);
    }

    for tok in tokens {
        let PatItem::Tok { kind, effects, .. } = &tok.item else {
            continue;
        };

        match kind {
            PatTokenKind::InlineInst(name, count) => {
                check_known_instrument(name, warnings);
                match count {
                    None => {
                        override_frame = None;
                        running_instrument = Some(name.clone());
                    }
                    Some(n) => {
                        override_frame = Some(Override { name: name.clone(), remaining: *n, previous: running_instrument.clone() });
                    }
                }
                continue;
            }
            PatTokenKind::Rest(0) => {
                if let Some(pan_effect) = effects.iter().find(|e| e.name == "pan") {
                    if let Some(raw) = pan_effect.params.first() {
                        running_pan = Pan::parse(raw);
                    }
                }
                continue;
            }
            _ => {}
        }

        let dur = match kind {
            PatTokenKind::Note(_, d) | PatTokenKind::Rest(d) | PatTokenKind::Named(_, d) => *d,
            PatTokenKind::InlineInst(..) => unreachable!(),
        };
        let ticks = ((dur as f64 / speed).round() as i64).max(1) as u32;
        let pan = resolve_pan(effects, &running_pan, channel_pan);
        let is_note_producing = !matches!(kind, PatTokenKind::Rest(_));

        let active_instrument = if is_note_producing {
            if let Some(frame) = &mut override_frame {
                let name = frame.name.clone();
                frame.remaining = frame.remaining.saturating_sub(1);
                if frame.remaining == 0 {
                    running_instrument = frame.previous.clone();
                    override_frame = None;
                }
                Some(name)
            } else {
                running_instrument.clone()
            }
        } else {
            running_instrument.clone()
        };

        let ism_kind = match kind {
            PatTokenKind::Rest(_) => IsmEventKind::Rest,
            PatTokenKind::Note(name, _) => match note_to_midi(name) {
                Some(pitch) => IsmEventKind::Note { pitch, name: name.clone() },
                None => {
                    warnings.push(ResolveWarning::new(COMPONENT, format!("malformed note '{name}'")));
                    IsmEventKind::Rest
                }
            },
            PatTokenKind::Named(name, _) => IsmEventKind::Named { name: name.clone() },
            PatTokenKind::InlineInst(..) => unreachable!(),
        };

        out.push(IsmEvent {
            kind: ism_kind,
            ticks,
            instrument: active_instrument,
            effects: effects.clone(),
            pan,
            source_sequence: if is_note_producing { source_sequence.clone() } else { None },
            source_pattern: if is_note_producing { tok.source_pattern.clone() } else { None },
            bar_number: if is_note_producing { Some((cumulative_ticks / ticks_per_bar) as u32) } else { None },
            event_index: if is_note_producing { Some(event_index) } else { None },
        });
        if is_note_producing {
            event_index += 1;
        }
        cumulative_ticks += ticks as u64;
    }

    // An override still open at end-of-stream never got its full `N`
    // note-producing tokens; fire the remainder as immediate named hits.
    if let Some(frame) = override_frame.take() {
        for _ in 0..frame.remaining {
            out.push(IsmEvent {
                kind: IsmEventKind::Named { name: frame.name.clone() },
                ticks: 1,
                instrument: Some(frame.name.clone()),
                effects: Vec::new(),
                pan: channel_pan.map(|p| p.as_value()),
                source_sequence: source_sequence.clone(),
                source_pattern: None,
                bar_number: Some((cumulative_ticks / ticks_per_bar) as u32),
                event_index: Some(event_index),
            });
            event_index += 1;
            cumulative_ticks += 1;
        }
    }

    out
}

fn resolve_pan(effects: &[crate::ast::EffectSpec], running_pan: &Option<Pan>, channel_pan: Option<Pan>) -> Option<f64> {
    if let Some(effect) = effects.iter().find(|e| e.name == "pan") {
        if let Some(raw) = effect.params.first() {
            if let Some(p) = Pan::parse(raw) {
                return Some(p.as_value());
            }
        }
    }
    if let Some(p) = running_pan {
        return Some(p.as_value());
    }
    channel_pan.map(|p| p.as_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn s1_basic_melody() {
        let song = parse(
            "chip gameboy\nbpm 120\ninst lead type=pulse1 duty=50 env=gb:12,down,1\npat mel = C4 E4 G4 C5\nseq main = mel\nchannel 1 => inst lead seq main",
        )
        .unwrap();
        let (ism, warnings) = resolve(&song).unwrap();
        assert!(warnings.is_empty());
        let chan = &ism.channels[0];
        let names: Vec<&str> = chan
            .events
            .iter()
            .map(|e| match &e.kind {
                IsmEventKind::Note { name, .. } => name.as_str(),
                _ => "?",
            })
            .collect();
        assert_eq!(names, vec!["C4", "E4", "G4", "C5"]);
        for e in &chan.events {
            assert_eq!(e.ticks, 1);
            assert_eq!(e.instrument.as_deref(), Some("lead"));
            assert_eq!(e.source_sequence.as_deref(), Some("main"));
        }
        let indices: Vec<u32> = chan.events.iter().map(|e| e.event_index.unwrap()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn s2_rest_and_reverse() {
        let song = parse("pat p = C4 . E4\nseq s = p:rev\nchannel 1 => pat s").unwrap();
        let (ism, _) = resolve(&song).unwrap();
        let chan = &ism.channels[0];
        assert_eq!(chan.events.len(), 3);
        assert!(matches!(&chan.events[0].kind, IsmEventKind::Note { name, .. } if name == "E4"));
        assert!(matches!(chan.events[1].kind, IsmEventKind::Rest));
        assert!(matches!(&chan.events[2].kind, IsmEventKind::Note { name, .. } if name == "C4"));
    }

    #[test]
    fn s3_named_trigger_immediate_hits() {
        let song = parse(
            "inst snare type=noise env=gb:12,down,1\npat P = . . inst(snare,2)\nchannel 4 => inst snare pat P",
        )
        .unwrap();
        let (ism, _) = resolve(&song).unwrap();
        let chan = &ism.channels[0];
        assert_eq!(chan.events.len(), 4);
        assert!(matches!(chan.events[0].kind, IsmEventKind::Rest));
        assert!(matches!(chan.events[1].kind, IsmEventKind::Rest));
        assert!(matches!(&chan.events[2].kind, IsmEventKind::Named { name } if name == "snare"));
        assert!(matches!(&chan.events[3].kind, IsmEventKind::Named { name } if name == "snare"));
    }

    #[test]
    fn s4_temporary_override() {
        let song = parse(
            "inst temp type=pulse1 duty=50 env=gb:12,down,1\npat R = inst(temp,2) C4 D4 E4\nchannel 1 => inst temp pat R",
        )
        .unwrap();
        let (ism, _) = resolve(&song).unwrap();
        let chan = &ism.channels[0];
        assert_eq!(chan.events.len(), 3);
        let insts: Vec<Option<&str>> = chan.events.iter().map(|e| e.instrument.as_deref()).collect();
        assert_eq!(insts, vec![Some("temp"), Some("temp"), Some("temp")]);
    }

    #[test]
    fn unknown_instrument_reference_warns() {
        let song = parse("pat mel = C4\nchannel 1 => inst ghost pat mel").unwrap();
        let (_, warnings) = resolve(&song).unwrap();
        assert!(warnings.iter().any(|w| w.message.contains("ghost")));
    }

    #[test]
    fn inline_pan_effect_outranks_channel_pan() {
        let song = parse("pat mel = C4<pan:R> D4\nchannel 1 => pat mel pan=L").unwrap();
        let (ism, _) = resolve(&song).unwrap();
        let chan = &ism.channels[0];
        assert_eq!(chan.events[0].pan, Some(1.0));
        assert_eq!(chan.events[1].pan, Some(-1.0));
    }

    #[test]
    fn source_pattern_tracks_through_sequence_reference() {
        let song = parse("pat mel = C4\nseq main = mel\nchannel 1 => inst lead seq main").unwrap();
        let (ism, _) = resolve(&song).unwrap();
        assert_eq!(ism.channels[0].events[0].source_pattern.as_deref(), Some("mel"));
    }
}
