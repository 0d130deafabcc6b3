#![warn(missing_docs)]
//! BeatBax tick scheduler, buffered renderer, and Game Boy DMG-01 DSP
//! kernels: turns a resolved [`beatbax_lang::Ism`] into scheduled audio.
//!
//! The pipeline stages run in order:
//!
//! 1. [`player::Player::play_ism`] walks the ISM into scheduled events,
//!    maintaining the active-node registry.
//! 2. [`render::render_ism`] (or, for live playback, [`scheduler::Scheduler`]
//!    driving per-segment calls into [`render::render_event`]) dispatches
//!    each event to the [`chip`] kernel matching its instrument kind.
//! 3. [`mixer::Mixer`] combines per-channel output into a stereo frame,
//!    honoring mute/solo and pan.

pub mod chip;
pub mod effects;
pub mod error;
pub mod mixer;
pub mod player;
pub mod render;
pub mod scheduler;

pub use error::{PlaybackError, RenderError, Result};
pub use player::Player;
pub use render::{render_ism, RenderConfig, StereoBuffer};
