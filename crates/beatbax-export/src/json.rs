//! ISM JSON export sink.
//!
//! The resolved [`Ism`] no longer retains the raw pattern/sequence bodies
//! (the resolver consumes them during expansion) or a `defaultInstrument`
//! per channel beyond what's already baked into each event's `instrument`
//! field — so unlike the wire format's `song.pats`/`song.seqs`, this sink
//! serializes `bpm`, `insts`, and `channels` only. See `DESIGN.md` for the
//! Open-Question decision.

use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;

use beatbax_lang::ast::Instrument;
use beatbax_lang::ism::{Ism, IsmEvent, IsmEventKind};

use crate::error::Result;

const ISM_JSON_VERSION: u32 = 1;

fn is_empty_slice<T>(slice: &&[T]) -> bool {
    slice.is_empty()
}

#[derive(Debug, Serialize)]
struct ExportedIsm<'a> {
    version: u32,
    #[serde(rename = "exportedAt")]
    exported_at: &'a str,
    song: ExportedSong<'a>,
}

#[derive(Debug, Serialize)]
struct ExportedSong<'a> {
    bpm: f64,
    insts: BTreeMap<&'a str, &'a Instrument>,
    channels: Vec<ExportedChannel<'a>>,
}

#[derive(Debug, Serialize)]
struct ExportedChannel<'a> {
    id: u8,
    events: Vec<ExportedEvent<'a>>,
}

#[derive(Debug, Serialize)]
struct ExportedEvent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instrument: Option<&'a str>,
    ticks: u32,
    #[serde(skip_serializing_if = "is_empty_slice")]
    effects: &'a [beatbax_lang::ast::EffectSpec],
    #[serde(skip_serializing_if = "Option::is_none")]
    pan: Option<f64>,
    #[serde(rename = "sourceSequence", skip_serializing_if = "Option::is_none")]
    source_sequence: Option<&'a str>,
    #[serde(rename = "barNumber", skip_serializing_if = "Option::is_none")]
    bar_number: Option<u32>,
    #[serde(rename = "eventIndex", skip_serializing_if = "Option::is_none")]
    event_index: Option<u32>,
}

impl<'a> From<&'a IsmEvent> for ExportedEvent<'a> {
    fn from(event: &'a IsmEvent) -> Self {
        let (kind, token) = match &event.kind {
            IsmEventKind::Rest => ("rest", None),
            IsmEventKind::Note { name, .. } => ("note", Some(name.as_str())),
            IsmEventKind::Named { name } => ("named", Some(name.as_str())),
        };
        ExportedEvent {
            kind,
            token,
            instrument: event.instrument.as_deref(),
            ticks: event.ticks,
            effects: &event.effects,
            pan: event.pan,
            source_sequence: event.source_sequence.as_deref(),
            bar_number: event.bar_number,
            event_index: event.event_index,
        }
    }
}

/// Serialize `ism` as pretty-printed ISM JSON to `writer`.
/// `exported_at` should be an ISO 8601 timestamp supplied by the caller —
/// this sink never reads the wall clock itself, keeping it deterministic.
pub fn export_ism_json<W: Write>(ism: &Ism, exported_at: &str, writer: W) -> Result<()> {
    let insts: BTreeMap<&str, &Instrument> = ism.instruments.iter().map(|(name, inst)| (name.as_str(), inst.as_ref())).collect();
    let channels = ism
        .channels
        .iter()
        .map(|c| ExportedChannel { id: c.channel, events: c.events.iter().map(ExportedEvent::from).collect() })
        .collect();
    let exported = ExportedIsm {
        version: ISM_JSON_VERSION,
        exported_at,
        song: ExportedSong { bpm: ism.tempo_bpm, insts, channels },
    };
    serde_json::to_writer_pretty(writer, &exported)?;
    Ok(())
}

/// Serialize `ism` as an ISM JSON string.
pub fn export_ism_json_string(ism: &Ism, exported_at: &str) -> Result<String> {
    let mut buf = Vec::new();
    export_ism_json(ism, exported_at, &mut buf)?;
    Ok(String::from_utf8(buf).expect("serde_json never emits invalid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatbax_lang::compile;

    #[test]
    fn exports_events_with_their_discriminant_tag() {
        let src = "bpm 140\ninst lead type=pulse1\npat mel = C4 .\nchannel 1 => inst lead pat mel\nplay";
        let (ism, _) = compile(src, ".").unwrap();
        let json = export_ism_json_string(&ism, "2026-07-31T00:00:00Z").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["song"]["bpm"], 140.0);
        assert_eq!(value["song"]["channels"][0]["events"][0]["type"], "note");
        assert_eq!(value["song"]["channels"][0]["events"][1]["type"], "rest");
    }

    #[test]
    fn rest_events_omit_optional_metadata_fields() {
        let src = "bpm 120\ninst lead type=pulse1\npat mel = .\nchannel 1 => inst lead pat mel\nplay";
        let (ism, _) = compile(src, ".").unwrap();
        let json = export_ism_json_string(&ism, "2026-07-31T00:00:00Z").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let event = &value["song"]["channels"][0]["events"][0];
        assert!(event.get("sourceSequence").is_none());
        assert!(event.get("eventIndex").is_none());
    }
}
