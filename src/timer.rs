//! Deferred door effects: auto-close, greeting sound, delayed part moves.
//!
//! Timers are plain data fired by [`crate::engine::DoorEngine::tick`]; they
//! are ordered by due time, then by the order they were scheduled in.

use crate::structure::PartIndex;
use crate::types::Transform;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum TimerAction {
    /// Close the door, keeping the lock state captured at scheduling time.
    AutoClose { locked: bool },
    /// Play the greeting sound.
    Greeting,
    /// Move a part's current object to `target`.
    Animate {
        part: PartIndex,
        target: Transform,
        duration: f32,
    },
}

#[derive(Debug, Clone)]
pub struct ScheduledTimer {
    pub due: Duration,
    /// Door state generation the timer was scheduled under.
    pub generation: u64,
    pub action: TimerAction,
    seq: u64,
}

impl PartialEq for ScheduledTimer {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledTimer {}

impl PartialOrd for ScheduledTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<ScheduledTimer>>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: Duration, generation: u64, action: TimerAction) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(ScheduledTimer {
            due,
            generation,
            action,
            seq,
        }));
    }

    /// Remove and return the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<ScheduledTimer> {
        if self.heap.peek()?.0.due > now {
            return None;
        }
        self.heap.pop().map(|Reverse(t)| t)
    }

    pub fn next_due(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(t)| t.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
