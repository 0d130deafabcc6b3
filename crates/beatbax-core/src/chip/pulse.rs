//! Pulse channel generator and frequency sweep.
//!
//! The waveform is a band-limited Fourier series rather than a naive
//! hard-edged square wave, so high harmonics don't alias against the
//! render sample rate.

use std::f64::consts::PI;

use beatbax_lang::ast::{Direction, Sweep};

use super::constants::MAX_REGISTER;
use super::registers::{freq_from_register, register_from_freq};

/// Highest harmonic considered; also capped per-sample by the Nyquist
/// frequency of the current sample rate.
const MAX_HARMONICS: usize = 200;

/// Stateful band-limited pulse oscillator.
#[derive(Debug, Clone, Default)]
pub struct PulseOscillator {
    phase: f64,
}

impl PulseOscillator {
    /// A fresh oscillator starting at phase 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one sample and return its value in `-1.0..=1.0`.
    pub fn sample(&mut self, duty: f64, freq: f64, sample_rate: f64) -> f64 {
        if freq <= 0.0 {
            return 0.0;
        }
        let nyquist = sample_rate / 2.0;
        let max_k = ((nyquist / freq).floor() as usize).clamp(1, MAX_HARMONICS);
        let mut acc = 0.0;
        for k in 1..=max_k {
            let a_k = (2.0 / (k as f64 * PI)) * (k as f64 * PI * duty).sin();
            acc += a_k * (2.0 * PI * k as f64 * self.phase).sin();
        }
        self.phase += freq / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        acc
    }
}

/// Outcome of one sweep step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// New register value to play.
    Register(u16),
    /// Overflow past the top of the register range: channel silences.
    Silenced,
}

/// Advance a pulse1 sweep unit by one step from `reg`.
pub fn sweep_step(reg: u16, sweep: &Sweep) -> SweepOutcome {
    let delta = reg >> sweep.shift;
    match sweep.direction {
        Direction::Up => {
            let next = reg as u32 + delta as u32;
            if next > MAX_REGISTER as u32 {
                SweepOutcome::Silenced
            } else {
                SweepOutcome::Register(next as u16)
            }
        }
        Direction::Down => SweepOutcome::Register(reg.saturating_sub(delta)),
    }
}

/// Run a sweep unit to completion starting from `start_freq`, returning the
/// `(time_offset_seconds, register)` of every frequency-set event up to and
/// including the silencing step, if any.
pub fn run_sweep(start_freq: f64, sweep: &Sweep, sweep_frame_seconds: f64) -> Vec<(f64, Option<u16>)> {
    if sweep.time == 0 {
        return Vec::new();
    }
    let step_seconds = sweep.time as f64 * sweep_frame_seconds;
    let mut events = Vec::new();
    let mut reg = register_from_freq(start_freq);
    let mut t = step_seconds;
    loop {
        match sweep_step(reg, sweep) {
            SweepOutcome::Register(next) => {
                reg = next;
                events.push((t, Some(reg)));
                if reg == 0 && sweep.direction == Direction::Down {
                    break;
                }
            }
            SweepOutcome::Silenced => {
                events.push((t, None));
                break;
            }
        }
        t += step_seconds;
        if events.len() > (MAX_REGISTER as usize) {
            break; // defensive: a shift of 0 never converges
        }
    }
    events
}

/// Frequency for a register produced by a sweep step, or `None` if the
/// channel silenced.
pub fn sweep_freq(outcome: Option<u16>) -> Option<f64> {
    outcome.map(freq_from_register)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_sweep_halves_register_each_step() {
        // reg=1000, time=4, direction=down, shift=1
        let sweep = Sweep { time: 4, direction: Direction::Down, shift: 1 };
        let SweepOutcome::Register(after_one) = sweep_step(1000, &sweep) else {
            panic!("expected a register");
        };
        assert_eq!(after_one, 500);
        let SweepOutcome::Register(after_two) = sweep_step(after_one, &sweep) else {
            panic!("expected a register");
        };
        assert_eq!(after_two, 250);
    }

    #[test]
    fn sweep_up_overflow_silences() {
        let sweep = Sweep { time: 1, direction: Direction::Up, shift: 0 };
        assert_eq!(sweep_step(MAX_REGISTER, &sweep), SweepOutcome::Silenced);
    }

    #[test]
    fn sweep_down_clamps_at_zero() {
        let sweep = Sweep { time: 1, direction: Direction::Down, shift: 3 };
        assert_eq!(sweep_step(4, &sweep), SweepOutcome::Register(3));
        assert_eq!(sweep_step(0, &sweep), SweepOutcome::Register(0));
    }

    #[test]
    fn oscillator_produces_bounded_output() {
        let mut osc = PulseOscillator::new();
        for _ in 0..1000 {
            let s = osc.sample(0.5, 440.0, 44_100.0);
            assert!((-1.5..=1.5).contains(&s));
        }
    }
}
