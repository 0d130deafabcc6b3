//! Wavetable channel generator.

use super::constants::WAVE_TABLE_LEN;

/// A normalized playback buffer built from a 16-nibble wave table.
#[derive(Debug, Clone)]
pub struct WaveBuffer {
    samples: [f64; WAVE_TABLE_LEN],
}

impl WaveBuffer {
    /// Build from a 16-nibble (0..=15) table: `table[i]/15 * 0.9`.
    pub fn from_table(table: &[u8; WAVE_TABLE_LEN]) -> Self {
        let mut samples = [0.0; WAVE_TABLE_LEN];
        for (i, &nibble) in table.iter().enumerate() {
            samples[i] = (nibble.min(15) as f64 / 15.0) * 0.9;
        }
        Self { samples }
    }

    /// Sample the buffer at a fractional index, wrapping with linear
    /// interpolation.
    pub fn at(&self, phase: f64) -> f64 {
        let len = WAVE_TABLE_LEN as f64;
        let p = phase.rem_euclid(1.0) * len;
        let i0 = p.floor() as usize % WAVE_TABLE_LEN;
        let i1 = (i0 + 1) % WAVE_TABLE_LEN;
        let frac = p.fract();
        self.samples[i0] * (1.0 - frac) + self.samples[i1] * frac
    }
}

/// Stateful wavetable oscillator, looping at `alignedFreq * tableLen /
/// sampleRate` steps per sample.
#[derive(Debug, Clone, Default)]
pub struct WaveOscillator {
    phase: f64,
}

impl WaveOscillator {
    /// A fresh oscillator at phase 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one sample and return the buffer value at the current phase.
    pub fn sample(&mut self, buffer: &WaveBuffer, aligned_freq: f64, sample_rate: f64) -> f64 {
        let value = buffer.at(self.phase);
        let step = aligned_freq / sample_rate;
        self.phase = (self.phase + step).rem_euclid(1.0);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_scales_nibbles_to_ninety_percent_of_full_scale() {
        let table = [15; WAVE_TABLE_LEN];
        let buf = WaveBuffer::from_table(&table);
        assert!((buf.at(0.0) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn buffer_wraps_around() {
        let mut table = [0u8; WAVE_TABLE_LEN];
        table[0] = 15;
        let buf = WaveBuffer::from_table(&table);
        assert!((buf.at(1.0) - buf.at(0.0)).abs() < 1e-9);
    }

    #[test]
    fn oscillator_advances_phase_by_frequency_ratio() {
        let buf = WaveBuffer::from_table(&[15; WAVE_TABLE_LEN]);
        let mut osc = WaveOscillator::new();
        for _ in 0..100 {
            osc.sample(&buf, 440.0, 44_100.0);
        }
        assert!(osc.phase > 0.0);
    }
}
