//! Game Boy DMG-01 APU hardware constants.

/// System clock feeding every channel's frequency timer.
pub const GB_CLOCK: f64 = 4_194_304.0;

/// Length of one volume-envelope step ("envelope frame"), in seconds.
/// The hardware clocks the envelope at `GB_CLOCK / 65536`.
pub const ENVELOPE_FRAME_SECONDS: f64 = 65536.0 / GB_CLOCK;

/// Length of one sweep step, in seconds. The hardware sweep unit ticks at
/// 128 Hz, gated by the `sweepTime` field (0..=7, in units of this period).
pub const SWEEP_FRAME_SECONDS: f64 = 1.0 / 128.0;

/// Number of samples in the wavetable channel's playback buffer.
pub const WAVE_TABLE_LEN: usize = 16;

/// Highest allowed frequency register value (11 bits).
pub const MAX_REGISTER: u16 = 2047;
