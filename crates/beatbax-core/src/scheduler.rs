//! Tick scheduler: a single-threaded, time-ordered callback
//! queue with a configurable lookahead, mirroring the role of a Web Audio
//! `setInterval`/`requestAnimationFrame` driver loop but adapted to Rust's
//! lack of closures-as-values-we-can-cheaply-clone — payloads are plain
//! data the caller interprets on drain, rather than boxed callbacks.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Default driver interval, in milliseconds.
pub const DEFAULT_DRIVER_INTERVAL_MS: f64 = 25.0;
/// Default lookahead window, in milliseconds.
pub const DEFAULT_LOOKAHEAD_MS: f64 = 100.0;
/// Default frame rate used by [`Scheduler::schedule_aligned`].
pub const DEFAULT_FRAME_HZ: f64 = 512.0;

#[derive(Debug)]
struct Entry<T> {
    time: f64,
    seq: u64,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    // Reversed so `BinaryHeap` (a max-heap) pops the earliest time first,
    // and the lowest insertion sequence first among ties (FIFO).
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Ordered queue of `(time, payload)` pairs. Events scheduled for the same
/// time drain in FIFO insertion order; across different times, strict
/// ascending order.
#[derive(Debug)]
pub struct Scheduler<T> {
    queue: BinaryHeap<Entry<T>>,
    next_seq: u64,
    lookahead_seconds: f64,
}

impl<T> Scheduler<T> {
    /// A scheduler with the default 100ms lookahead.
    pub fn new() -> Self {
        Self::with_lookahead(DEFAULT_LOOKAHEAD_MS / 1000.0)
    }

    /// A scheduler with a custom lookahead, in seconds.
    pub fn with_lookahead(lookahead_seconds: f64) -> Self {
        Self { queue: BinaryHeap::new(), next_seq: 0, lookahead_seconds }
    }

    /// Insert `payload` to fire at `time` (seconds).
    pub fn schedule(&mut self, time: f64, payload: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Entry { time, seq, payload });
    }

    /// Insert `payload` to fire at the nearest `1/frame_hz` boundary at or
    /// before `time` — used to place envelope/sweep steps on the hardware
    /// frame grid.
    pub fn schedule_aligned(&mut self, time: f64, payload: T, frame_hz: f64) {
        let frame_period = 1.0 / frame_hz;
        let aligned = (time / frame_period).floor() * frame_period;
        self.schedule(aligned, payload);
    }

    /// Pop every entry with `time <= now + lookahead`, in fire order.
    pub fn drain_ready(&mut self, now: f64) -> Vec<T> {
        let horizon = now + self.lookahead_seconds;
        let mut ready = Vec::new();
        while let Some(top) = self.queue.peek() {
            if top.time > horizon {
                break;
            }
            ready.push(self.queue.pop().unwrap().payload);
        }
        ready
    }

    /// Discard every pending entry.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Number of pending entries.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue has no pending entries.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_ascending_time_order() {
        let mut sched = Scheduler::with_lookahead(0.0);
        sched.schedule(0.5, "b");
        sched.schedule(0.1, "a");
        sched.schedule(1.0, "c");
        assert_eq!(sched.drain_ready(1.0), vec!["a", "b", "c"]);
    }

    #[test]
    fn same_time_entries_drain_fifo() {
        let mut sched = Scheduler::with_lookahead(0.0);
        sched.schedule(0.2, "first");
        sched.schedule(0.2, "second");
        sched.schedule(0.2, "third");
        assert_eq!(sched.drain_ready(0.2), vec!["first", "second", "third"]);
    }

    #[test]
    fn lookahead_holds_back_future_entries() {
        let mut sched = Scheduler::with_lookahead(0.1);
        sched.schedule(1.0, "near");
        sched.schedule(5.0, "far");
        assert_eq!(sched.drain_ready(0.95), vec!["near"]);
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn schedule_aligned_rounds_down_to_frame_boundary() {
        let mut sched = Scheduler::with_lookahead(0.0);
        sched.schedule_aligned(0.0033, "x", 512.0);
        let drained = sched.drain_ready(0.01);
        assert_eq!(drained, vec!["x"]);
    }

    #[test]
    fn clear_drops_every_pending_entry() {
        let mut sched = Scheduler::with_lookahead(0.0);
        sched.schedule(1.0, "a");
        sched.schedule(2.0, "b");
        sched.clear();
        assert!(sched.is_empty());
    }
}
