//! Standard MIDI File export: a Type-1 SMF, one
//! track per channel, PPQ 480, 120 ticks (a sixteenth note) per source
//! token.

use std::io::Write;

use beatbax_lang::ast::InstrumentType;
use beatbax_lang::ism::{Ism, IsmEventKind};

use crate::error::Result;

const PPQ: u16 = 480;
const TICKS_PER_TOKEN: u32 = 120;
const DRUM_CHANNEL: u8 = 9;

fn program_for(kind: InstrumentType) -> u8 {
    match kind {
        InstrumentType::Pulse1 => 80,
        InstrumentType::Pulse2 => 34,
        InstrumentType::Wave => 81,
        InstrumentType::Noise => 39,
    }
}

fn drum_key_for(name: &str) -> u8 {
    match name {
        "hh" => 42,
        "sn" => 38,
        "kick" => 36,
        _ => 39,
    }
}

/// Write a variable-length quantity.
fn write_vlq(out: &mut Vec<u8>, mut value: u32) {
    let mut stack = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        stack.push(((value & 0x7F) as u8) | 0x80);
        value >>= 7;
    }
    for byte in stack.into_iter().rev() {
        out.push(byte);
    }
}

fn chunk(tag: &[u8; 4], body: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(tag);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend(body);
    out
}

fn tempo_track(bpm: f64) -> Vec<u8> {
    let micros_per_quarter = (60_000_000.0 / bpm).round() as u32;
    let mut body = Vec::new();
    write_vlq(&mut body, 0);
    body.extend_from_slice(&[0xFF, 0x51, 0x03]);
    body.extend_from_slice(&micros_per_quarter.to_be_bytes()[1..4]);
    write_vlq(&mut body, 0);
    body.extend_from_slice(&[0xFF, 0x2F, 0x00]); // end of track
    chunk(b"MTrk", body)
}

fn note_track(ism: &Ism, channel_events: &beatbax_lang::ism::ChannelEvents, track_index: u8) -> Vec<u8> {
    let mut body = Vec::new();
    let is_drum_channel = channel_events.events.iter().filter_map(|e| e.instrument.as_ref()).filter_map(|name| ism.instruments.get(name)).any(|i| i.kind == InstrumentType::Noise);
    let midi_channel = if is_drum_channel { DRUM_CHANNEL } else { (track_index - 1).min(8) };

    let mut current_program: Option<u8> = None;
    let mut pending_delta: u32 = 0;

    for event in &channel_events.events {
        let dur_ticks = event.ticks * TICKS_PER_TOKEN;
        match &event.kind {
            IsmEventKind::Rest => {
                pending_delta += dur_ticks;
            }
            IsmEventKind::Note { .. } | IsmEventKind::Named { .. } => {
                let instrument = event.instrument.as_ref().and_then(|n| ism.instruments.get(n));
                if let Some(inst) = instrument {
                    let program = program_for(inst.kind);
                    if current_program != Some(program) && !is_drum_channel {
                        write_vlq(&mut body, pending_delta);
                        pending_delta = 0;
                        body.extend_from_slice(&[0xC0 | midi_channel, program]);
                        current_program = Some(program);
                    }
                }
                let key = match &event.kind {
                    IsmEventKind::Note { pitch, .. } => (*pitch).clamp(0, 127) as u8,
                    IsmEventKind::Named { name } => drum_key_for(name),
                    IsmEventKind::Rest => unreachable!(),
                };
                write_vlq(&mut body, pending_delta);
                pending_delta = 0;
                body.extend_from_slice(&[0x90 | midi_channel, key, 100]);
                write_vlq(&mut body, dur_ticks);
                body.extend_from_slice(&[0x80 | midi_channel, key, 0]);
            }
        }
    }
    write_vlq(&mut body, 0);
    body.extend_from_slice(&[0xFF, 0x2F, 0x00]);
    chunk(b"MTrk", body)
}

/// Write `ism` as a Type-1 Standard MIDI File to `writer`.
pub fn export_midi<W: Write>(ism: &Ism, mut writer: W) -> Result<()> {
    let track_count = 1 + ism.channels.len() as u16;
    let mut header_body = Vec::new();
    header_body.extend_from_slice(&1u16.to_be_bytes()); // format 1
    header_body.extend_from_slice(&track_count.to_be_bytes());
    header_body.extend_from_slice(&PPQ.to_be_bytes());
    let header = chunk(b"MThd", header_body);

    let mut out = header;
    out.extend(tempo_track(ism.tempo_bpm));
    for channel in &ism.channels {
        out.extend(note_track(ism, channel, channel.channel));
    }
    writer.write_all(&out).map_err(|e| crate::error::ExportError::Io { path: "<writer>".to_string(), source: e })?;
    Ok(())
}

/// Write `ism` as a Type-1 Standard MIDI File byte vector.
pub fn export_midi_bytes(ism: &Ism) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    export_midi(ism, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatbax_lang::compile;

    #[test]
    fn header_declares_format_one_and_one_track_per_channel_plus_tempo() {
        let src = "bpm 120\ninst lead type=pulse1\npat mel = C4 D4\nchannel 1 => inst lead pat mel\nplay";
        let (ism, _) = compile(src, ".").unwrap();
        let bytes = export_midi_bytes(&ism).unwrap();
        assert_eq!(&bytes[0..4], b"MThd");
        let format = u16::from_be_bytes([bytes[8], bytes[9]]);
        let tracks = u16::from_be_bytes([bytes[10], bytes[11]]);
        let ppq = u16::from_be_bytes([bytes[12], bytes[13]]);
        assert_eq!(format, 1);
        assert_eq!(tracks, 2); // tempo track + 1 channel track
        assert_eq!(ppq, PPQ);
    }

    #[test]
    fn noise_channel_routes_to_the_gm_drum_channel() {
        let src = "bpm 120\ninst snare type=noise\npat hit = snare\nchannel 4 => inst snare pat hit\nplay";
        let (ism, _) = compile(src, ".").unwrap();
        let bytes = export_midi_bytes(&ism).unwrap();
        // The note-on status byte for channel 9 (0-indexed) is 0x99.
        assert!(bytes.windows(1).any(|w| w[0] == 0x99));
    }
}
