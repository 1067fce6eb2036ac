// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Timer queue: deadline-ordered, ties broken by insertion order so two
//! timers armed for the same instant still fire FIFO (spec §4.2 dispatch
//! order).

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

struct Entry {
    deadline: Instant,
    sequence: u64,
    id: TimerId,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}
impl Eq for Entry {}
impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.sequence).cmp(&(other.deadline, other.sequence))
    }
}

/// A min-heap of pending timer deadlines.
#[derive(Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<Entry>>,
    cancelled: HashSet<TimerId>,
    next_id: u64,
    next_sequence: u64,
}

impl TimerQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a new timer for `deadline`, returning its id (for cancellation).
    pub fn arm(&mut self, deadline: Instant) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(Reverse(Entry { deadline, sequence, id }));
        id
    }

    /// Mark a timer cancelled so it won't fire. Cancellation is lazy: the
    /// entry is simply skipped when popped, so this is `O(1)`, matching the
    /// `kCancelledOperation` sentinel approach in
    /// `original_source/vm/message_loop_iocp.cc`. Returns `false` if
    /// `id` had already been cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.cancelled.insert(id)
    }

    /// Time until the next live (non-cancelled) timer fires, if any.
    #[must_use]
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.drop_cancelled();
        self.heap.peek().map(|Reverse(entry)| entry.deadline)
    }

    /// Pop every timer whose deadline has passed `now`, in deadline (then
    /// insertion) order.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<TimerId> {
        self.drop_cancelled();
        let mut fired = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }
            let Reverse(entry) = self.heap.pop().unwrap_or_else(|| unreachable!("just peeked"));
            fired.push(entry.id);
        }
        fired
    }

    fn drop_cancelled(&mut self) {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if self.cancelled.remove(&entry.id) {
                self.heap.pop();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::time::Duration;

    #[test]
    fn timers_fire_in_deadline_order() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();
        let late = queue.arm(now + Duration::from_millis(50));
        let early = queue.arm(now + Duration::from_millis(10));
        let fired = queue.pop_expired(now + Duration::from_millis(100));
        assert_eq!(fired, vec![early, late]);
    }

    #[test]
    fn ties_break_in_insertion_order() {
        let mut queue = TimerQueue::new();
        let deadline = Instant::now();
        let first = queue.arm(deadline);
        let second = queue.arm(deadline);
        assert_eq!(queue.pop_expired(deadline), vec![first, second]);
    }

    #[test]
    fn cancelled_timers_are_skipped() {
        let mut queue = TimerQueue::new();
        let now = Instant::now();
        let id = queue.arm(now);
        assert!(queue.cancel(id));
        assert!(queue.pop_expired(now + Duration::from_millis(1)).is_empty());
    }
}
