//! Time-ordering rules for the engine's two event sequences.
//!
//! The *scheduled* sequence holds future events; the *current* sequence holds the events
//! due inside the window being dispatched. Every event enters through [`Scheduler::schedule`],
//! which rewrites stale timestamps, spaces out same-id clock callbacks and routes the event
//! to the right sequence.
//!
//! An event is stale when it is earlier than the context time or than the latest event
//! already dispatched. Dispatching ahead of the block clock (`begin_until`) therefore raises
//! the floor for everything scheduled afterwards, and dispatched timestamps never decrease.

use crate::event::{ClockId, Event, EventTarget, MillisecondTime};
use crate::sequence::EventSequence;

#[derive(Clone, Copy, Debug)]
struct Window {
    end: MillisecondTime,
    inclusive: bool,
}

impl Window {
    #[inline]
    fn contains(&self, time: MillisecondTime) -> bool {
        if self.inclusive {
            time <= self.end
        } else {
            time < self.end
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct DispatchingClock {
    target: Option<EventTarget>,
    clock_id: ClockId,
    time: MillisecondTime,
}

/// Owns the scheduled and current sequences plus the clock of the engine.
#[derive(Debug)]
pub struct Scheduler {
    scheduled: EventSequence,
    current: EventSequence,
    /// Start of the next (or running) block.
    now: MillisecondTime,
    context_time: MillisecondTime,
    /// Latest timestamp handed out by `next_due`.
    dispatched: MillisecondTime,
    window: Option<Window>,
    dispatching: Option<DispatchingClock>,
    min_interval: MillisecondTime,
    scratch: Vec<Event>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl Scheduler {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            scheduled: EventSequence::with_capacity(capacity),
            current: EventSequence::with_capacity(capacity),
            now: 0.0,
            context_time: 0.0,
            dispatched: 0.0,
            window: None,
            dispatching: None,
            min_interval: 0.0,
            scratch: Vec::with_capacity(capacity.min(64)),
        }
    }

    #[inline]
    pub fn now(&self) -> MillisecondTime {
        self.now
    }

    /// Time seen by whoever is scheduling right now.
    #[inline]
    pub fn context_time(&self) -> MillisecondTime {
        self.context_time
    }

    pub(crate) fn set_context_time(&mut self, time: MillisecondTime) {
        self.context_time = time;
    }

    /// Latest timestamp dispatched so far.
    #[inline]
    pub fn dispatched_time(&self) -> MillisecondTime {
        self.dispatched
    }

    /// Earliest time a newly scheduled event may carry.
    #[inline]
    pub fn earliest_time(&self) -> MillisecondTime {
        self.context_time.max(self.dispatched)
    }

    /// Minimum spacing between two clock callbacks of the same id (one sample, in ms).
    pub fn min_interval(&self) -> MillisecondTime {
        self.min_interval
    }

    pub fn set_min_interval(&mut self, interval: MillisecondTime) {
        self.min_interval = if interval.is_finite() && interval > 0.0 {
            interval
        } else {
            0.0
        };
    }

    #[inline]
    pub fn is_dispatching(&self) -> bool {
        self.window.is_some()
    }

    /// Insert an event, applying the rewrite, clock coalescing and routing rules.
    pub fn schedule(&mut self, mut event: Event) {
        // NaN fails the comparison and counts as past.
        let earliest = self.earliest_time();
        if !(event.time() >= earliest) {
            event.set_time(earliest);
        }
        if let Some((target, clock_id)) = event.clock_key() {
            let time = self.coalesce_clock(target, clock_id, event.time());
            event.set_time(time);
        }
        self.route(event);
    }

    fn route(&mut self, event: Event) {
        match self.window {
            Some(window) if window.contains(event.time()) => {
                self.current.add_event(event);
            }
            _ => {
                self.scheduled.add_event(event);
            }
        }
    }

    fn coalesce_clock(
        &self,
        target: Option<EventTarget>,
        clock_id: ClockId,
        mut time: MillisecondTime,
    ) -> MillisecondTime {
        let min = self.min_interval;
        if min <= 0.0 {
            return time;
        }
        let dispatching = self
            .dispatching
            .filter(|d| d.target == target && d.clock_id == clock_id)
            .map(|d| d.time);

        loop {
            let conflict = dispatching
                .into_iter()
                .chain(
                    self.current
                        .iter()
                        .chain(self.scheduled.iter())
                        .filter(|e| e.is_clock_for(target, clock_id))
                        .map(Event::time),
                )
                .filter(|t| (time - t).abs() < min)
                .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))));

            match conflict {
                Some(t) if t + min > time => time = t + min,
                _ => return time,
            }
        }
    }

    /// Open the half-open window `[now, end)` and pull the due events into current.
    pub fn begin_block(&mut self, end: MillisecondTime) {
        self.context_time = self.now;
        self.window = Some(Window {
            end,
            inclusive: false,
        });
        let due = self.scheduled.first_event_at_or_after(end);
        self.pull_due(due);
    }

    /// Open the closed window `[.., until]` and pull the due events into current.
    ///
    /// `until` is raised to the latest dispatched time, so events that were moved up to
    /// that floor are due as well.
    pub fn begin_until(&mut self, until: MillisecondTime) {
        let until = until.max(self.dispatched);
        self.window = Some(Window {
            end: until,
            inclusive: true,
        });
        let due = self.scheduled.first_event_after_time(until);
        self.pull_due(due);
    }

    fn pull_due(&mut self, count: usize) {
        let current = &mut self.current;
        self.scheduled.drain_front(count, |event| {
            current.add_event(event);
        });
    }

    /// Pop the next due event and move context time to its timestamp.
    pub fn next_due(&mut self) -> Option<Event> {
        let event = self.current.pop_front()?;
        if event.time() > self.context_time {
            self.context_time = event.time();
        }
        if event.time() > self.dispatched {
            self.dispatched = event.time();
        }
        self.dispatching = event.clock_key().map(|(target, clock_id)| DispatchingClock {
            target,
            clock_id,
            time: event.time(),
        });
        Some(event)
    }

    /// Close the dispatch window. Anything left in current goes back to scheduled.
    pub fn finish_dispatch(&mut self) {
        self.window = None;
        self.dispatching = None;
        while let Some(event) = self.current.pop_front() {
            self.scheduled.add_event(event);
        }
        self.context_time = self.now;
    }

    /// Move the clock to the end of the processed block.
    pub fn advance(&mut self, end: MillisecondTime) {
        if end > self.now {
            self.now = end;
        }
        self.context_time = self.now;
    }

    /// Remove pending clock events for `(target, clock_id)` from both sequences.
    ///
    /// With `execute`, the removed events are re-inserted at the context time so they
    /// fire next instead of at their original time. Returns how many were flushed.
    pub fn flush_clock_events(
        &mut self,
        target: Option<EventTarget>,
        clock_id: ClockId,
        execute: bool,
    ) -> usize {
        let mut flushed = std::mem::take(&mut self.scratch);
        flushed.clear();
        let pred = |e: &Event| e.is_clock_for(target, clock_id);
        self.current.take_matching(pred, &mut flushed);
        self.scheduled.take_matching(pred, &mut flushed);
        let count = flushed.len();

        if execute {
            let at = self.earliest_time();
            for mut event in flushed.drain(..) {
                event.set_time(at);
                self.route(event);
            }
        }
        flushed.clear();
        self.scratch = flushed;
        count
    }

    /// Drop every event addressed to `generation`. Returns how many were erased.
    pub fn erase_generation(&mut self, generation: u32) -> usize {
        let before = self.len();
        let keep = |e: &Event| e.target().map_or(true, |t| t.generation() != generation);
        self.current.retain(keep);
        self.scheduled.retain(keep);
        before - self.len()
    }

    /// Pending events: current first, then scheduled.
    pub fn pending(&self) -> impl Iterator<Item = &Event> {
        self.current.iter().chain(self.scheduled.iter())
    }

    pub fn scheduled(&self) -> &EventSequence {
        &self.scheduled
    }

    pub fn current(&self) -> &EventSequence {
        &self.current
    }

    pub fn len(&self) -> usize {
        self.current.len() + self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.scheduled.is_empty()
    }
}
