#![warn(missing_docs)]
//! BeatBax export sinks: ISM JSON, Standard MIDI File, hUGETracker
//! UGE v6, and WAV.

pub mod error;
pub mod json;
pub mod midi;
pub mod uge;
pub mod wav;

pub use error::{ExportError, ExportWarning, Result};
