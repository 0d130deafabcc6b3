//! Volume envelope realization.
//!
//! A Game Boy hardware envelope (`{initial, direction, period}`) expands to
//! a discrete value-curve of `volume/15` steps, one every `period` envelope
//! frames. A `period == 0` envelope has no hardware timer driving it, so it
//! falls back to a legacy ADSR curve instead.

use beatbax_lang::ast::{Direction, Envelope};

use super::constants::ENVELOPE_FRAME_SECONDS;

/// A resolved envelope ready to be sampled against elapsed time within a
/// note's duration.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeCurve {
    /// Discrete Game Boy hardware steps, each held for `step_seconds`.
    Steps {
        /// Volume values in `0.0..=1.0`, one per step, in playback order.
        values: Vec<f64>,
        /// Seconds each step is held for.
        step_seconds: f64,
    },
    /// Legacy ADSR envelope (used when the Game Boy envelope period is 0).
    Adsr {
        /// Attack time in seconds.
        attack: f64,
        /// Decay time in seconds.
        decay: f64,
        /// Sustain level, `0.0..=1.0`.
        sustain: f64,
        /// Release time in seconds.
        release: f64,
    },
}

impl EnvelopeCurve {
    /// Build the curve for `env`, valid for a note held at most `note_dur`
    /// seconds (the ADSR release phase and hardware step count don't extend
    /// the curve past what a given note duration could actually use).
    pub fn build(env: &Envelope, note_dur: f64) -> Self {
        match *env {
            Envelope::Gb { initial, direction, period } if period > 0 => {
                EnvelopeCurve::Steps {
                    values: build_step_values(initial, direction),
                    step_seconds: period as f64 * ENVELOPE_FRAME_SECONDS,
                }
            }
            Envelope::Gb { initial, .. } => EnvelopeCurve::Adsr {
                attack: 0.001,
                decay: (note_dur * 0.2).max(0.0),
                sustain: initial as f64 / 15.0,
                release: 0.020,
            },
            Envelope::Adsr { attack, decay, sustain, release } => {
                EnvelopeCurve::Adsr { attack, decay, sustain, release }
            }
        }
    }

    /// Amplitude (`0.0..=1.0`) at `elapsed` seconds into the note.
    pub fn amplitude_at(&self, elapsed: f64, note_dur: f64) -> f64 {
        match self {
            EnvelopeCurve::Steps { values, step_seconds } => {
                if *step_seconds <= 0.0 || values.is_empty() {
                    return values.first().copied().unwrap_or(0.0);
                }
                let idx = (elapsed / step_seconds) as usize;
                values[idx.min(values.len() - 1)]
            }
            EnvelopeCurve::Adsr { attack, decay, sustain, release } => {
                if elapsed < *attack {
                    (elapsed / attack.max(1e-9)).min(1.0)
                } else if elapsed < attack + decay {
                    let t = (elapsed - attack) / decay.max(1e-9);
                    1.0 - t * (1.0 - sustain)
                } else if elapsed < note_dur {
                    *sustain
                } else {
                    let t = ((elapsed - note_dur) / release.max(1e-9)).min(1.0);
                    sustain * (1.0 - t)
                }
            }
        }
    }
}

/// Walk `initial` toward 0 (direction down) or 15 (direction up) one step
/// at a time, terminating on saturation. Length is bounded by the distance
/// to the rail, so at most 16 entries.
fn build_step_values(initial: u8, direction: Direction) -> Vec<f64> {
    let mut values = Vec::with_capacity(16);
    let mut level = initial as i32;
    values.push(level as f64 / 15.0);
    loop {
        let next = match direction {
            Direction::Down => level - 1,
            Direction::Up => level + 1,
        };
        if !(0..=15).contains(&next) {
            break;
        }
        level = next;
        values.push(level as f64 / 15.0);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_curve_starts_at_initial_over_fifteen() {
        let env = Envelope::Gb { initial: 12, direction: Direction::Down, period: 1 };
        let curve = EnvelopeCurve::build(&env, 1.0);
        match curve {
            EnvelopeCurve::Steps { values, .. } => {
                assert!(values.len() <= 16);
                assert_eq!(values[0], 12.0 / 15.0);
                assert_eq!(*values.last().unwrap(), 0.0);
            }
            other => panic!("expected Steps, got {other:?}"),
        }
    }

    #[test]
    fn step_curve_length_is_bounded_by_distance_to_rail() {
        let env = Envelope::Gb { initial: 3, direction: Direction::Down, period: 1 };
        let curve = EnvelopeCurve::build(&env, 1.0);
        match curve {
            EnvelopeCurve::Steps { values, .. } => assert_eq!(values.len(), 4), // 3,2,1,0
            other => panic!("expected Steps, got {other:?}"),
        }
    }

    #[test]
    fn zero_period_falls_back_to_adsr() {
        let env = Envelope::Gb { initial: 15, direction: Direction::Down, period: 0 };
        let curve = EnvelopeCurve::build(&env, 0.5);
        assert!(matches!(curve, EnvelopeCurve::Adsr { .. }));
    }
}
