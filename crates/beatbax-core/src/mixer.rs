//! Channel mixing and stereo placement.
//!
//! Mirrors the role of `ym2149-core`'s `Mixer`/`ChannelState` (per-channel
//! mute state plus a final combine-to-output stage) but for four
//! independently-muted Game Boy channels and a continuous pan value rather
//! than a three-channel tone/noise gate mask.

/// Per-channel runtime state a player toggles at will.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelState {
    /// User mute flag.
    pub muted: bool,
    /// User solo flag. If any channel is soloed, every non-soloed channel
    /// is silent regardless of its own `muted` value.
    pub soloed: bool,
}

/// Combines up to four channels' mono samples into a stereo frame,
/// honoring mute/solo and equal-power panning.
#[derive(Debug, Clone, Default)]
pub struct Mixer {
    /// Per-channel state, indexed by `channel_id - 1`.
    pub channels: [ChannelState; 4],
}

impl Mixer {
    /// A fresh mixer with every channel unmuted and unsoloed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mute or unmute a channel (`channel` is 1..=4).
    pub fn set_mute(&mut self, channel: u8, muted: bool) {
        if let Some(state) = self.state_mut(channel) {
            state.muted = muted;
        }
    }

    /// Solo or unsolo a channel (`channel` is 1..=4).
    pub fn set_solo(&mut self, channel: u8, soloed: bool) {
        if let Some(state) = self.state_mut(channel) {
            state.soloed = soloed;
        }
    }

    /// Whether `channel` should currently produce audible output.
    pub fn is_audible(&self, channel: u8) -> bool {
        let Some(state) = self.state(channel) else { return false };
        let any_soloed = self.channels.iter().any(|c| c.soloed);
        if any_soloed {
            state.soloed
        } else {
            !state.muted
        }
    }

    /// Apply equal-power panning to a mono `sample`, returning `(left,
    /// right)`. `pan` is `-1.0` (hard left) to `1.0` (hard right).
    pub fn pan_sample(sample: f64, pan: f64) -> (f64, f64) {
        let pan = pan.clamp(-1.0, 1.0);
        let angle = (pan + 1.0) * std::f64::consts::FRAC_PI_4;
        (sample * angle.cos(), sample * angle.sin())
    }

    fn state(&self, channel: u8) -> Option<&ChannelState> {
        self.channels.get(channel.checked_sub(1)? as usize)
    }

    fn state_mut(&mut self, channel: u8) -> Option<&mut ChannelState> {
        self.channels.get_mut(channel.checked_sub(1)? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmuted_channel_is_audible_by_default() {
        let mixer = Mixer::new();
        assert!(mixer.is_audible(1));
    }

    #[test]
    fn muted_channel_is_not_audible() {
        let mut mixer = Mixer::new();
        mixer.set_mute(2, true);
        assert!(!mixer.is_audible(2));
        assert!(mixer.is_audible(1));
    }

    #[test]
    fn solo_silences_every_other_channel() {
        let mut mixer = Mixer::new();
        mixer.set_solo(3, true);
        assert!(mixer.is_audible(3));
        assert!(!mixer.is_audible(1));
        assert!(!mixer.is_audible(4));
    }

    #[test]
    fn center_pan_splits_evenly() {
        let (l, r) = Mixer::pan_sample(1.0, 0.0);
        assert!((l - r).abs() < 1e-9);
        assert!(l > 0.0);
    }

    #[test]
    fn hard_left_silences_right_channel() {
        let (l, r) = Mixer::pan_sample(1.0, -1.0);
        assert!(l > 0.9);
        assert!(r.abs() < 1e-9);
    }
}
