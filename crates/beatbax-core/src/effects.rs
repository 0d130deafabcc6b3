//! Per-event effect handlers.
//!
//! Effects are resolved once per event into a [`ResolvedEffects`] bundle of
//! time-sampling functions, then queried by the renderer at each output
//! sample. Unrecognized effect names or malformed parameters are a silent
//! no-op rather than an error — effects are best-effort by design (spec:
//! "if the runtime lacks a capability, they no-op silently"). Execution
//! order is inline effects first in source order, channel-default pan last
//! as a fallback.

use std::f64::consts::PI;

use beatbax_lang::ast::{EffectSpec, Pan};

/// LFO applied to oscillator frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vibrato {
    /// Oscillation rate in Hz.
    pub rate_hz: f64,
    /// Peak deviation in cents.
    pub depth_cents: f64,
}

/// Linear frequency glide toward a semitone offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Portamento {
    /// Target offset from the base pitch, in semitones.
    pub target_semitones: f64,
    /// Time to reach the target, in seconds.
    pub glide_seconds: f64,
}

/// Rapid stepped pitch change over a list of semitone offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct Arpeggio {
    /// Semitone offsets cycled through, starting at index 0.
    pub offsets: Vec<i32>,
    /// Seconds spent on each offset before advancing.
    pub step_seconds: f64,
}

/// Linear volume ramp over the duration of the event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeSlide {
    /// Amplitude change per second (can be negative).
    pub per_second: f64,
}

/// Amplitude LFO.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tremolo {
    /// Oscillation rate in Hz.
    pub rate_hz: f64,
    /// Peak amplitude reduction, `0.0..=1.0`.
    pub depth: f64,
}

/// Re-trigger the note's envelope/phase at a fixed interval within the
/// event's duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retrig {
    /// Seconds between retriggers.
    pub interval_seconds: f64,
}

/// All effects resolved for a single event, ready to sample against
/// elapsed time within the event.
#[derive(Debug, Clone, Default)]
pub struct ResolvedEffects {
    /// Constant or endpoint-interpolated pan, if any effect or channel
    /// default set one.
    pub pan: Option<(f64, f64)>,
    /// Vibrato, if present.
    pub vibrato: Option<Vibrato>,
    /// Portamento, if present.
    pub portamento: Option<Portamento>,
    /// Arpeggio, if present.
    pub arpeggio: Option<Arpeggio>,
    /// Volume slide, if present.
    pub volume_slide: Option<VolumeSlide>,
    /// Tremolo, if present.
    pub tremolo: Option<Tremolo>,
    /// Retrigger interval, if present.
    pub retrig: Option<Retrig>,
}

impl ResolvedEffects {
    /// Resolve the effects attached to a token, falling back to
    /// `channel_pan` when no `pan` effect is present.
    pub fn resolve(effects: &[EffectSpec], channel_pan: Option<f64>, default_vibrato_depth_cents: f64) -> Self {
        let mut out = ResolvedEffects { pan: channel_pan.map(|p| (p, p)), ..Default::default() };
        for effect in effects {
            match effect.name.as_str() {
                "pan" => {
                    if let Some(pan) = parse_pan_params(&effect.params) {
                        out.pan = Some(pan);
                    }
                }
                "vib" => {
                    let rate = parse_f64(effect.params.first());
                    let depth = parse_f64(effect.params.get(1)).unwrap_or(default_vibrato_depth_cents);
                    if let Some(rate_hz) = rate {
                        out.vibrato = Some(Vibrato { rate_hz, depth_cents: depth });
                    }
                }
                "port" => {
                    let target = parse_f64(effect.params.first());
                    let time = parse_f64(effect.params.get(1)).unwrap_or(0.1);
                    if let Some(target_semitones) = target {
                        out.portamento = Some(Portamento { target_semitones, glide_seconds: time.max(0.0) });
                    }
                }
                "arp" => {
                    let offsets: Vec<i32> = effect.params.iter().filter_map(|p| p.trim().parse().ok()).collect();
                    if !offsets.is_empty() {
                        let step = parse_named_f64(&effect.params, "step").unwrap_or(0.05);
                        out.arpeggio = Some(Arpeggio { offsets, step_seconds: step.max(0.0) });
                    }
                }
                "volSlide" => {
                    if let Some(per_second) = parse_f64(effect.params.first()) {
                        out.volume_slide = Some(VolumeSlide { per_second });
                    }
                }
                "trem" => {
                    let rate = parse_f64(effect.params.first());
                    let depth = parse_f64(effect.params.get(1)).unwrap_or(0.3);
                    if let Some(rate_hz) = rate {
                        out.tremolo = Some(Tremolo { rate_hz, depth: depth.clamp(0.0, 1.0) });
                    }
                }
                "retrig" => {
                    if let Some(interval_seconds) = parse_f64(effect.params.first()) {
                        out.retrig = Some(Retrig { interval_seconds: interval_seconds.max(0.001) });
                    }
                }
                // "echo" and "sweep" are handled at the player/kernel level
                // (echo needs a delay tap into the mixer; sweep is chip
                // register automation already covered by chip::pulse).
                "echo" | "sweep" => {}
                _ => {}
            }
        }
        out
    }

    /// Pan value at `t` seconds into the event, if any pan applies.
    pub fn pan_at(&self, t: f64, dur: f64) -> Option<f64> {
        self.pan.map(|(from, to)| {
            if from == to || dur <= 0.0 {
                from
            } else {
                let frac = (t / dur).clamp(0.0, 1.0);
                from + (to - from) * frac
            }
        })
    }

    /// Combined semitone offset from vibrato, portamento, and arpeggio at
    /// `t` seconds into the event.
    pub fn semitone_offset_at(&self, t: f64) -> f64 {
        let mut offset = 0.0;
        if let Some(vib) = &self.vibrato {
            offset += (vib.depth_cents / 100.0) * (2.0 * PI * vib.rate_hz * t).sin();
        }
        if let Some(port) = &self.portamento {
            let frac = if port.glide_seconds <= 0.0 { 1.0 } else { (t / port.glide_seconds).clamp(0.0, 1.0) };
            offset += port.target_semitones * frac;
        }
        if let Some(arp) = &self.arpeggio {
            if arp.step_seconds > 0.0 && !arp.offsets.is_empty() {
                let idx = (t / arp.step_seconds) as usize % arp.offsets.len();
                offset += arp.offsets[idx] as f64;
            }
        }
        offset
    }

    /// Amplitude multiplier from volume slide and tremolo at `t` seconds
    /// into the event.
    pub fn amplitude_multiplier_at(&self, t: f64) -> f64 {
        let mut mult = 1.0;
        if let Some(slide) = &self.volume_slide {
            mult = (mult + slide.per_second * t).clamp(0.0, 1.0);
        }
        if let Some(trem) = &self.tremolo {
            mult *= 1.0 - trem.depth * (0.5 + 0.5 * (2.0 * PI * trem.rate_hz * t).sin());
        }
        mult.max(0.0)
    }
}

fn parse_pan_params(params: &[String]) -> Option<(f64, f64)> {
    if params.is_empty() {
        return None;
    }
    if params.len() >= 2 {
        let from = Pan::parse(&params[0])?.as_value();
        let to = Pan::parse(&params[1])?.as_value();
        return Some((from, to));
    }
    let p = Pan::parse(&params[0])?.as_value();
    Some((p, p))
}

fn parse_f64(value: Option<&String>) -> Option<f64> {
    value.and_then(|s| s.trim().parse().ok())
}

/// Find a `name=value` parameter among `params` and parse its value.
fn parse_named_f64(params: &[String], name: &str) -> Option<f64> {
    params.iter().find_map(|p| {
        let (key, value) = p.split_once('=')?;
        if key.trim() == name {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, params: &[&str]) -> EffectSpec {
        EffectSpec { name: name.to_string(), params: params.iter().map(|s| s.to_string()).collect() }
    }

    #[test]
    fn channel_pan_is_used_when_no_inline_pan_effect() {
        let resolved = ResolvedEffects::resolve(&[], Some(-1.0), 50.0);
        assert_eq!(resolved.pan_at(0.0, 1.0), Some(-1.0));
    }

    #[test]
    fn inline_pan_overrides_channel_default() {
        let resolved = ResolvedEffects::resolve(&[spec("pan", &["R"])], Some(-1.0), 50.0);
        assert_eq!(resolved.pan_at(0.0, 1.0), Some(1.0));
    }

    #[test]
    fn unknown_effect_is_a_silent_no_op() {
        let resolved = ResolvedEffects::resolve(&[spec("swoosh", &["1", "2"])], None, 50.0);
        assert_eq!(resolved.pan, None);
        assert_eq!(resolved.semitone_offset_at(0.5), 0.0);
    }

    #[test]
    fn vibrato_oscillates_around_zero() {
        let resolved = ResolvedEffects::resolve(&[spec("vib", &["5", "100"])], None, 50.0);
        let at_zero = resolved.semitone_offset_at(0.0);
        assert!((at_zero).abs() < 1e-9);
    }

    #[test]
    fn arpeggio_cycles_through_offsets() {
        let resolved = ResolvedEffects::resolve(&[spec("arp", &["0", "4", "7"])], None, 50.0);
        assert_eq!(resolved.semitone_offset_at(0.0), 0.0);
    }

    #[test]
    fn arpeggio_step_defaults_but_honors_a_named_override() {
        let default_step = ResolvedEffects::resolve(&[spec("arp", &["0", "4", "7"])], None, 50.0);
        assert_eq!(default_step.arpeggio.unwrap().step_seconds, 0.05);

        let custom_step = ResolvedEffects::resolve(&[spec("arp", &["0", "4", "7", "step=0.1"])], None, 50.0);
        assert_eq!(custom_step.arpeggio.unwrap().step_seconds, 0.1);
    }

    #[test]
    fn volume_slide_clamps_to_zero_and_one() {
        let resolved = ResolvedEffects::resolve(&[spec("volSlide", &["-10.0"])], None, 50.0);
        assert_eq!(resolved.amplitude_multiplier_at(1.0), 0.0);
    }
}
