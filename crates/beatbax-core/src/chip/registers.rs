//! Frequency ↔ period-register conversion.
//!
//! Mirrors the role of `ym2149-core`'s `Register`/`RegisterBank` (a
//! hardware-unit conversion layer sitting in front of the generators) but
//! for the Game Boy's single 11-bit period register shared by the pulse and
//! wave channels, rather than a 16-register bank.

use super::constants::MAX_REGISTER;

/// Frequency, in Hz, produced by a given period register value.
pub fn freq_from_register(reg: u16) -> f64 {
    let reg = reg.min(MAX_REGISTER) as f64;
    131_072.0 / (2048.0 - reg)
}

/// Period register value that best reproduces `freq`, clamped to the valid
/// `0..=2047` range.
pub fn register_from_freq(freq: f64) -> u16 {
    if freq <= 0.0 {
        return 0;
    }
    let raw = (2048.0 - 131_072.0 / freq).round();
    raw.clamp(0.0, MAX_REGISTER as f64) as u16
}

/// Snap `freq` to the nearest frequency actually reachable by the 11-bit
/// period register, i.e. quantize a requested frequency to the nearest
/// frequency actually representable in hardware.
pub fn quantize_freq(freq: f64) -> f64 {
    freq_from_register(register_from_freq(freq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_register_value() {
        for reg in 0..=MAX_REGISTER {
            let freq = freq_from_register(reg);
            let back = register_from_freq(freq);
            assert_eq!(back, reg, "register {reg} round-tripped to {back} via freq {freq}");
        }
    }

    #[test]
    fn register_440hz_is_in_range() {
        let reg = register_from_freq(440.0);
        assert!(reg <= MAX_REGISTER);
        assert!((freq_from_register(reg) - 440.0).abs() < 1.0);
    }

    #[test]
    fn zero_and_negative_frequencies_clamp_to_zero() {
        assert_eq!(register_from_freq(0.0), 0);
        assert_eq!(register_from_freq(-10.0), 0);
    }
}
