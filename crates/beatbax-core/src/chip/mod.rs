//! Game Boy DMG-01 APU DSP kernels: one generator per channel
//! type, plus the shared register/envelope math they all build on.

pub mod constants;
pub mod envelope;
pub mod noise;
pub mod pulse;
pub mod registers;
pub mod wave;
