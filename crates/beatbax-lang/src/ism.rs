//! The Internal Song Model (ISM): the resolver's output.
//!
//! A tagged-sum event stream per channel, already in tick units, with no
//! further reference to pattern/sequence names — everything the renderer
//! and export sinks need is carried on the event itself.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{EffectSpec, Instrument};

/// The payload of one ISM event.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum IsmEventKind {
    /// Silence for the event's tick duration.
    Rest,
    /// A pitched note.
    Note {
        /// MIDI pitch number.
        pitch: i32,
        /// Note name as written/transformed (`C4`, `F#3`, ...).
        name: String,
    },
    /// A named (percussion/instrument) trigger with no pitch of its own.
    Named {
        /// Trigger name, matched against an instrument or its `note=`
        /// default at render time.
        name: String,
    },
}

/// One scheduled event on a channel's timeline.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IsmEvent {
    /// What kind of event this is.
    pub kind: IsmEventKind,
    /// Duration in ticks (always >= 1).
    pub ticks: u32,
    /// Instrument in effect at the time this event was resolved.
    pub instrument: Option<String>,
    /// Effects attached to the originating token, in source order.
    pub effects: Vec<EffectSpec>,
    /// Resolved stereo pan, `-1.0..=1.0`, if any pan applies.
    pub pan: Option<f64>,
    /// Name of the channel's bound top-level sequence (or, if the channel
    /// is bound directly to a pattern, that pattern's name).
    pub source_sequence: Option<String>,
    /// Name of the pattern this specific event's token was expanded from,
    /// tracked through nested sequence references.
    pub source_pattern: Option<String>,
    /// Bar number (0-indexed) this event starts in.
    pub bar_number: Option<u32>,
    /// Index of this event within its channel's full event stream.
    pub event_index: Option<u32>,
}

impl IsmEvent {
    /// Required source-metadata invariant: `Note`/`Named`
    /// events must carry `source_sequence`/`bar_number`/`event_index`;
    /// `Rest` events never need them.
    pub fn has_required_metadata(&self) -> bool {
        match self.kind {
            IsmEventKind::Rest => true,
            IsmEventKind::Note { .. } | IsmEventKind::Named { .. } => {
                self.source_sequence.is_some() && self.bar_number.is_some() && self.event_index.is_some()
            }
        }
    }
}

/// One channel's resolved event stream.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChannelEvents {
    /// Channel id, 1..=4.
    pub channel: u8,
    /// Events in playback order.
    pub events: Vec<IsmEvent>,
    /// Seconds per tick on this channel's tick grid (depends on
    /// `bpm`/`ticksPerStep` and the channel's `speed` multiplier).
    pub seconds_per_tick: f64,
}

/// The complete resolved song: per-channel event streams plus the
/// instrument table they reference.
#[derive(Debug, Clone)]
pub struct Ism {
    /// Tempo the song was resolved at.
    pub tempo_bpm: f64,
    /// Resolved channels, in channel-id order.
    pub channels: Vec<ChannelEvents>,
    /// Instruments referenced by name from ISM events. `Arc`-shared since
    /// the renderer and every DSP kernel hold read-only references to the
    /// same instrument for the lifetime of playback.
    pub instruments: HashMap<String, Arc<Instrument>>,
}

impl Ism {
    /// Total event count across all channels.
    pub fn total_events(&self) -> usize {
        self.channels.iter().map(|c| c.events.len()).sum()
    }
}
