//! Per-event DSP dispatch and the buffered offline renderer.
//!
//! `render_event` turns one resolved ISM event into a mono sample buffer
//! using the chip kernel matching its instrument's [`InstrumentType`].
//! `render_ism` walks every channel's event stream end to end, advancing a
//! monotonic `absTime` cursor per channel,
//! mixing each event's output into a shared stereo buffer. Unknown or
//! malformed instruments are logged as non-fatal [`PlaybackError`]s and the
//! walk continues with the next event, matching the resolver's
//! warn-and-continue posture.

use beatbax_lang::ast::{Instrument, InstrumentType};
use beatbax_lang::ism::{Ism, IsmEventKind};

use crate::chip::constants::SWEEP_FRAME_SECONDS;
use crate::chip::envelope::EnvelopeCurve;
use crate::chip::noise::{lfsr_rate, NoiseOscillator};
use crate::chip::pulse::{self, PulseOscillator};
use crate::chip::registers::{freq_from_register, quantize_freq};
use crate::chip::wave::{WaveBuffer, WaveOscillator};
use crate::effects::ResolvedEffects;
use crate::error::PlaybackError;
use crate::mixer::Mixer;

/// Rendering configuration, with defaults matching the scheduler/renderer
/// timing constants described below.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    /// Output sample rate, Hz.
    pub sample_rate: f64,
    /// Scheduler lookahead, milliseconds.
    pub lookahead_ms: f64,
    /// Scheduler driver interval, milliseconds.
    pub driver_interval_ms: f64,
    /// Buffered-renderer segment length, seconds.
    pub segment_duration_s: f64,
    /// How far ahead of a segment's start to begin rendering it, seconds.
    pub segment_lookahead_s: f64,
    /// Back-pressure cap on concurrently pre-rendered segments.
    pub max_pre_render_segments: usize,
    /// Frame rate used for envelope/sweep grid alignment.
    pub frame_hz: f64,
    /// Scaling constant for the `vib` effect's cents-per-unit depth.
    pub vibrato_depth_cents: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            lookahead_ms: 100.0,
            driver_interval_ms: 25.0,
            segment_duration_s: 0.5,
            segment_lookahead_s: 0.25,
            max_pre_render_segments: 8,
            frame_hz: 512.0,
            vibrato_depth_cents: 50.0,
        }
    }
}

/// A non-interleaved stereo sample buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StereoBuffer {
    /// Left channel samples.
    pub left: Vec<f32>,
    /// Right channel samples.
    pub right: Vec<f32>,
}

impl StereoBuffer {
    /// `len` samples of silence on both channels.
    pub fn silence(len: usize) -> Self {
        Self { left: vec![0.0; len], right: vec![0.0; len] }
    }

    /// Sample count.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// Whether the buffer holds no samples.
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    fn ensure_len(&mut self, len: usize) {
        if self.left.len() < len {
            self.left.resize(len, 0.0);
            self.right.resize(len, 0.0);
        }
    }

    /// Mix `mono` into this buffer starting at `start_sample`, panning each
    /// sample with `pan`.
    pub fn add_at(&mut self, start_sample: usize, mono: &[f64], pan: f64) {
        self.ensure_len(start_sample + mono.len());
        for (i, &s) in mono.iter().enumerate() {
            let (l, r) = Mixer::pan_sample(s, pan);
            self.left[start_sample + i] += l as f32;
            self.right[start_sample + i] += r as f32;
        }
    }
}

fn midi_to_freq(pitch: i32) -> f64 {
    440.0 * 2f64.powf((pitch - 69) as f64 / 12.0)
}

/// Render one resolved event into a mono sample buffer at `cfg.sample_rate`.
/// `base_freq` is the event's fundamental (ignored for noise instruments).
pub fn render_event(instrument: &Instrument, base_freq: f64, dur_seconds: f64, effects: &ResolvedEffects, cfg: &RenderConfig) -> Vec<f64> {
    let n = ((dur_seconds * cfg.sample_rate).round() as usize).max(1);
    let mut out = vec![0.0; n];
    let envelope = EnvelopeCurve::build(&instrument.envelope, dur_seconds);

    match instrument.kind {
        InstrumentType::Pulse1 | InstrumentType::Pulse2 => {
            let duty = (instrument.duty.unwrap_or(50.0) / 100.0).clamp(0.01, 0.99);
            let mut osc = PulseOscillator::new();
            let sweep_schedule = if instrument.kind == InstrumentType::Pulse1 {
                instrument.sweep.map(|sweep| pulse::run_sweep(base_freq, &sweep, SWEEP_FRAME_SECONDS))
            } else {
                None
            };
            for (i, slot) in out.iter_mut().enumerate() {
                let t = i as f64 / cfg.sample_rate;
                let mut freq = base_freq;
                if let Some(events) = &sweep_schedule {
                    for (time, reg) in events {
                        if t < *time {
                            break;
                        }
                        freq = match reg {
                            Some(r) => freq_from_register(*r),
                            None => 0.0,
                        };
                    }
                }
                let freq = quantize_freq(freq * semitone_ratio(effects.semitone_offset_at(t)));
                let amp = envelope.amplitude_at(t, dur_seconds) * effects.amplitude_multiplier_at(t);
                *slot = osc.sample(duty, freq, cfg.sample_rate) * amp;
            }
        }
        InstrumentType::Wave => {
            let table = instrument.wave_table.unwrap_or([8; 16]);
            let buffer = WaveBuffer::from_table(&table);
            let mut osc = WaveOscillator::new();
            let aligned = quantize_freq(base_freq);
            for (i, slot) in out.iter_mut().enumerate() {
                let t = i as f64 / cfg.sample_rate;
                let freq = aligned * semitone_ratio(effects.semitone_offset_at(t));
                let amp = envelope.amplitude_at(t, dur_seconds) * effects.amplitude_multiplier_at(t);
                *slot = osc.sample(&buffer, freq, cfg.sample_rate) * amp;
            }
        }
        InstrumentType::Noise => {
            let params = instrument.noise.unwrap_or_default();
            let mut osc = NoiseOscillator::new(params.width);
            let rate = lfsr_rate(params.divisor, params.shift);
            // "when a volSlide or similar effect is present, envelope
            // automation is skipped in favor of the effect's own gain
            // control".
            let skip_envelope = effects.volume_slide.is_some() || effects.tremolo.is_some();
            for (i, slot) in out.iter_mut().enumerate() {
                let t = i as f64 / cfg.sample_rate;
                let amp = if skip_envelope { 1.0 } else { envelope.amplitude_at(t, dur_seconds) } * effects.amplitude_multiplier_at(t);
                *slot = osc.sample(rate, cfg.sample_rate) * amp;
            }
        }
    }
    out
}

fn semitone_ratio(semitones: f64) -> f64 {
    2f64.powf(semitones / 12.0)
}

fn base_frequency(kind: &IsmEventKind, instrument: &Instrument) -> Option<f64> {
    match kind {
        IsmEventKind::Note { pitch, .. } => Some(midi_to_freq(*pitch)),
        IsmEventKind::Named { .. } => {
            let note = instrument.default_note.as_deref().unwrap_or("C4");
            beatbax_lang::notes::note_to_midi(note).map(midi_to_freq)
        }
        IsmEventKind::Rest => None,
    }
}

/// Render an entire resolved song offline, mixing every channel's events
/// into a single stereo buffer. Returns the buffer alongside any non-fatal
/// per-event [`PlaybackError`]s encountered along the way.
pub fn render_ism(ism: &Ism, cfg: &RenderConfig) -> (StereoBuffer, Vec<PlaybackError>) {
    let mut errors = Vec::new();
    let mut total_samples = 0usize;

    // First pass: compute total length so the buffer is allocated once.
    for channel in &ism.channels {
        let mut t = 0.0;
        for event in &channel.events {
            t += event.ticks as f64 * channel.seconds_per_tick;
        }
        total_samples = total_samples.max((t * cfg.sample_rate).ceil() as usize);
    }
    let mut buffer = StereoBuffer::silence(total_samples);

    for channel in &ism.channels {
        let mut abs_time = 0.0;
        for event in &channel.events {
            let dur = event.ticks as f64 * channel.seconds_per_tick;
            match &event.kind {
                IsmEventKind::Rest => {}
                kind => {
                    let inst_name = match &event.instrument {
                        Some(name) => name.clone(),
                        None => {
                            errors.push(PlaybackError::NoInstrumentForTrigger(event_label(kind)));
                            abs_time += dur;
                            continue;
                        }
                    };
                    let Some(instrument) = ism.instruments.get(&inst_name) else {
                        errors.push(PlaybackError::UnknownInstrument(inst_name));
                        abs_time += dur;
                        continue;
                    };
                    let Some(base_freq) = base_frequency(kind, instrument) else {
                        errors.push(PlaybackError::NoInstrumentForTrigger(event_label(kind)));
                        abs_time += dur;
                        continue;
                    };
                    let effects = ResolvedEffects::resolve(&event.effects, event.pan, cfg.vibrato_depth_cents);
                    let mono = render_event(instrument, base_freq, dur, &effects, cfg);
                    let start_sample = (abs_time * cfg.sample_rate).round() as usize;
                    let pan = effects.pan_at(0.0, dur).unwrap_or(0.0);
                    buffer.add_at(start_sample, &mono, pan);
                }
            }
            abs_time += dur;
        }
    }

    (buffer, errors)
}

fn event_label(kind: &IsmEventKind) -> String {
    match kind {
        IsmEventKind::Note { name, .. } => name.clone(),
        IsmEventKind::Named { name } => name.clone(),
        IsmEventKind::Rest => "rest".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatbax_lang::compile;

    #[test]
    fn renders_a_minimal_song_without_errors() {
        let src = "bpm 120\ninst lead type=pulse1 duty=50 env=gb:15,down,2\npat mel = C4 D4 E4 F4\nchannel 1 => inst lead pat mel\nplay";
        let (ism, warnings) = compile(src, ".").expect("compiles");
        assert!(warnings.is_empty());
        let cfg = RenderConfig::default();
        let (buffer, errors) = render_ism(&ism, &cfg);
        assert!(errors.is_empty());
        assert!(!buffer.is_empty());
    }

    #[test]
    fn unknown_instrument_is_a_non_fatal_playback_error() {
        let src = "bpm 120\ninst lead type=pulse1\npat mel = C4\nchannel 1 => inst lead pat mel\nplay";
        let (mut ism, _) = compile(src, ".").expect("compiles");
        ism.channels[0].events[0].instrument = Some("missing".to_string());
        let cfg = RenderConfig::default();
        let (_buffer, errors) = render_ism(&ism, &cfg);
        assert_eq!(errors, vec![PlaybackError::UnknownInstrument("missing".to_string())]);
    }

    #[test]
    fn rest_only_song_renders_silence_of_correct_length() {
        let src = "bpm 120\ninst lead type=pulse1\npat mel = . . . .\nchannel 1 => inst lead pat mel\nplay";
        let (ism, _) = compile(src, ".").expect("compiles");
        let cfg = RenderConfig::default();
        let (buffer, errors) = render_ism(&ism, &cfg);
        assert!(errors.is_empty());
        assert!(buffer.left.iter().all(|&s| s == 0.0));
    }
}
