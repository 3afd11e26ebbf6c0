//! Time-ordered event container.

use std::collections::VecDeque;
use std::ops::Range;

use crate::event::{Event, MillisecondTime};

/// Events sorted by timestamp; equal timestamps keep insertion order.
///
/// Iteration always yields non-decreasing timestamps. Timestamps must not be NaN;
/// the scheduler rewrites NaN to the context time before insertion.
#[derive(Debug, Default)]
pub struct EventSequence {
    events: VecDeque<Event>,
}

impl EventSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
        }
    }

    /// Insert after every event with a timestamp `<=` the new one. Returns the insert index.
    pub fn add_event(&mut self, event: Event) -> usize {
        let time = event.time();
        let index = match self.events.back() {
            Some(last) if last.time() > time => self.events.partition_point(|e| e.time() <= time),
            _ => self.events.len(),
        };
        self.events.insert(index, event);
        index
    }

    /// Index of the first event with timestamp `> time` (`len()` if none).
    pub fn first_event_after_time(&self, time: MillisecondTime) -> usize {
        self.events.partition_point(|e| e.time() <= time)
    }

    /// Index of the first event with timestamp `>= time` (`len()` if none).
    pub fn first_event_at_or_after(&self, time: MillisecondTime) -> usize {
        self.events.partition_point(|e| e.time() < time)
    }

    /// Remove a range of events. Returns how many were removed.
    pub fn erase(&mut self, range: Range<usize>) -> usize {
        let end = range.end.min(self.events.len());
        let start = range.start.min(end);
        self.events.drain(start..end).count()
    }

    /// Remove the first `count` events, preserving their order, and hand each to `f`.
    pub fn drain_front(&mut self, count: usize, mut f: impl FnMut(Event)) {
        let count = count.min(self.events.len());
        for event in self.events.drain(..count) {
            f(event);
        }
    }

    pub fn retain(&mut self, f: impl FnMut(&Event) -> bool) {
        self.events.retain(f);
    }

    /// Move every event matching `pred` into `out` in time order. Returns how many moved.
    pub fn take_matching(&mut self, mut pred: impl FnMut(&Event) -> bool, out: &mut Vec<Event>) -> usize {
        let before = out.len();
        let mut i = 0;
        while i < self.events.len() {
            if pred(&self.events[i]) {
                if let Some(event) = self.events.remove(i) {
                    out.push(event);
                }
            } else {
                i += 1;
            }
        }
        out.len() - before
    }

    #[inline]
    pub fn pop_front(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    #[inline]
    pub fn front(&self) -> Option<&Event> {
        self.events.front()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Event> {
        self.events.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
