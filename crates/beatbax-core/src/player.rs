//! Player / transport: walks a resolved [`Ism`] into scheduled
//! events, tracks the active-node registry that `stop`/`stopChannel`
//! clean up, and exposes mute/solo via the [`Mixer`].

use beatbax_lang::ism::{Ism, IsmEventKind};

use crate::mixer::Mixer;
use crate::scheduler::Scheduler;

/// Emitted once per scheduled event, matching the shape of an
/// `onSchedule({chId, inst, token, time, dur, eventIndex, totalEvents})`
/// callback payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleNotification {
    /// Channel id, 1..=4.
    pub channel: u8,
    /// Instrument in effect for this event, if any.
    pub instrument: Option<String>,
    /// Human-readable token label (note name or trigger name).
    pub token: String,
    /// Absolute schedule time, seconds.
    pub time: f64,
    /// Event duration, seconds.
    pub dur: f64,
    /// Index within the channel's event stream.
    pub event_index: u32,
    /// Total event count in the channel's event stream.
    pub total_events: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveNode {
    channel: u8,
    start_time: f64,
    end_time: f64,
}

/// Owns the currently playing [`Ism`]'s active-node registry and the
/// scheduler driving it. One player per playback session; the ISM is
/// owned by the player for the duration of playback.
#[derive(Debug, Default)]
pub struct Player {
    mixer: Mixer,
    active: Vec<ActiveNode>,
    scheduler: Scheduler<ScheduleNotification>,
}

impl Player {
    /// A fresh player with every channel unmuted, nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule every channel's event stream starting at `start_time`
    /// (default 0.0), registering an active node per Note/Named event and
    /// returning the `onSchedule` notifications in scheduling order.
    pub fn play_ism(&mut self, ism: &Ism, start_time: f64) -> Vec<ScheduleNotification> {
        self.stop();
        let mut notifications = Vec::new();
        for channel in &ism.channels {
            let mut abs_time = start_time;
            let total_events = channel.events.len();
            for (i, event) in channel.events.iter().enumerate() {
                let dur = event.ticks as f64 * channel.seconds_per_tick;
                if !matches!(event.kind, IsmEventKind::Rest) {
                    self.active.push(ActiveNode { channel: channel.channel, start_time: abs_time, end_time: abs_time + dur });
                    let token = match &event.kind {
                        IsmEventKind::Note { name, .. } => name.clone(),
                        IsmEventKind::Named { name } => name.clone(),
                        IsmEventKind::Rest => unreachable!(),
                    };
                    let notification = ScheduleNotification {
                        channel: channel.channel,
                        instrument: event.instrument.clone(),
                        token,
                        time: abs_time,
                        dur,
                        event_index: i as u32,
                        total_events,
                    };
                    self.scheduler.schedule(abs_time, notification.clone());
                    notifications.push(notification);
                }
                abs_time += dur;
            }
        }
        notifications
    }

    /// Clear the scheduler, stop every active node, and drop the active-node
    /// registry. Idempotent.
    pub fn stop(&mut self) {
        self.scheduler.clear();
        self.active.clear();
    }

    /// Stop only `channel`'s active nodes and pending scheduled events.
    /// No active node tagged `channel` remains afterward.
    pub fn stop_channel(&mut self, channel: u8) {
        self.active.retain(|node| node.channel != channel);
        let remaining: Vec<_> = self.scheduler.drain_ready(f64::INFINITY).into_iter().filter(|n| n.channel != channel).collect();
        self.scheduler.clear();
        for notification in remaining {
            self.scheduler.schedule(notification.time, notification);
        }
    }

    /// Active node count currently tagged `channel`.
    pub fn active_node_count(&self, channel: u8) -> usize {
        self.active.iter().filter(|n| n.channel == channel).count()
    }

    /// Toggle a channel's mute state and return the new value.
    pub fn toggle_channel_mute(&mut self, channel: u8) -> bool {
        let new_state = !self.is_muted(channel);
        self.mixer.set_mute(channel, new_state);
        new_state
    }

    /// Toggle a channel's solo state and return the new value.
    pub fn toggle_channel_solo(&mut self, channel: u8) -> bool {
        let new_state = !self.is_soloed(channel);
        self.mixer.set_solo(channel, new_state);
        new_state
    }

    fn is_muted(&self, channel: u8) -> bool {
        self.mixer.channels.get(channel.saturating_sub(1) as usize).map(|c| c.muted).unwrap_or(false)
    }

    fn is_soloed(&self, channel: u8) -> bool {
        self.mixer.channels.get(channel.saturating_sub(1) as usize).map(|c| c.soloed).unwrap_or(false)
    }

    /// Read access to the mixer, e.g. to check audibility while rendering.
    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatbax_lang::compile;

    fn two_channel_song() -> Ism {
        let src = "bpm 120\n\
inst lead type=pulse1\n\
inst snare type=noise\n\
pat mel = C4 D4 E4 F4\n\
pat hit = snare snare snare snare\n\
channel 1 => inst lead pat mel\n\
channel 4 => inst snare pat hit\n\
play";
        compile(src, ".").unwrap().0
    }

    #[test]
    fn play_ism_registers_an_active_node_per_note() {
        let ism = two_channel_song();
        let mut player = Player::new();
        let notifications = player.play_ism(&ism, 0.0);
        assert_eq!(notifications.len(), 8);
        assert_eq!(player.active_node_count(1), 4);
        assert_eq!(player.active_node_count(4), 4);
    }

    #[test]
    fn stop_channel_leaves_no_active_nodes_tagged_that_channel() {
        let ism = two_channel_song();
        let mut player = Player::new();
        player.play_ism(&ism, 0.0);
        player.stop_channel(1);
        assert_eq!(player.active_node_count(1), 0);
        assert_eq!(player.active_node_count(4), 4);
    }

    #[test]
    fn stop_clears_every_channel() {
        let ism = two_channel_song();
        let mut player = Player::new();
        player.play_ism(&ism, 0.0);
        player.stop();
        assert_eq!(player.active_node_count(1), 0);
        assert_eq!(player.active_node_count(4), 0);
        assert!(player.scheduler.is_empty());
    }

    #[test]
    fn solo_silences_unsoloed_channels() {
        let mut player = Player::new();
        player.toggle_channel_solo(1);
        assert!(player.mixer().is_audible(1));
        assert!(!player.mixer().is_audible(2));
    }
}
