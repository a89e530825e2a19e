//! Time-windowed event buffer
//!
//! Events are kept in arrival order. Eviction truncates the head in one
//! operation, so the buffer never needs reordering.

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::wire::Event;

/// Ordered store of displayed events
pub struct EventBuffer {
    /// Admitted events, non-decreasing by arrival
    events: VecDeque<Event>,
    /// Events waiting for their (future) arrival time, unordered
    staged: Vec<Event>,
    /// Display retention (seconds)
    window: f64,
    /// Hard cap on admitted events
    max_events: usize,
    /// Events dropped because the cap was hit
    overflowed: u64,
}

impl EventBuffer {
    pub fn new(window: f64, max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            staged: Vec::new(),
            window,
            max_events: max_events.max(1),
            overflowed: 0,
        }
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    /// Append events to the tail.
    ///
    /// Callers supply arrival times no earlier than the last pushed event.
    /// Returns how many of the oldest events the cap pushed out.
    pub fn push(&mut self, events: impl IntoIterator<Item = Event>) -> usize {
        let mut dropped = 0;
        for event in events {
            debug_assert!(
                self.events.back().map_or(true, |last| last.arrival <= event.arrival),
                "push out of arrival order"
            );
            if self.events.len() >= self.max_events {
                self.events.pop_front();
                dropped += 1;
            }
            self.events.push_back(event);
        }
        if dropped > 0 {
            self.overflowed += dropped as u64;
            debug!(
                dropped,
                overflowed = self.overflowed,
                max_events = self.max_events,
                "Event cap reached, oldest events dropped"
            );
        }
        trace!(len = self.events.len(), "Events pushed");
        dropped
    }

    /// Hold an event back until its arrival time is reached
    pub fn stage(&mut self, event: Event) {
        self.staged.push(event);
    }

    /// Move staged events whose arrival time has passed into the buffer.
    ///
    /// Returns the number admitted.
    pub fn admit_due(&mut self, now: f64) -> usize {
        if self.staged.is_empty() {
            return 0;
        }

        let mut due: Vec<Event> = Vec::new();
        self.staged.retain(|e| {
            if e.arrival <= now {
                due.push(*e);
                false
            } else {
                true
            }
        });
        due.sort_by(|a, b| a.arrival.total_cmp(&b.arrival));

        let admitted = due.len();
        self.push(due);
        admitted
    }

    /// Drop every event older than the window.
    ///
    /// Returns the number of events removed.
    pub fn evict(&mut self, now: f64) -> usize {
        let cutoff = self.events.partition_point(|e| now - e.arrival > self.window);
        if cutoff > 0 {
            self.events.drain(..cutoff);
            debug!(evicted = cutoff, remaining = self.events.len(), "Evicted stale events");
        }
        cutoff
    }

    /// Current contents, oldest first
    pub fn snapshot(&self) -> impl ExactSizeIterator<Item = &Event> + '_ {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }
}
