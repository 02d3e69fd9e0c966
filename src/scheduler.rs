/// Pending-event queue of a run.
///
/// A `BinaryHeap` over [`Event`], whose `Ord` is reversed so the heap pops
/// the smallest `(scheduled_at, id)` first. Ids come from one counter, so
/// events sharing a timestamp leave in the order they were scheduled.

use std::collections::BinaryHeap;

use crate::event::{Event, EventId, EventIdGen, EventType};
use crate::time::VirtualTime;

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Event>,
    ids: EventIdGen,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            ids: EventIdGen::new(),
        }
    }

    /// Enqueue `payload` for dispatch at `at` and return its id.
    pub fn schedule(&mut self, at: VirtualTime, payload: EventType) -> EventId {
        let id = self.ids.next_id();
        tracing::trace!(%id, %at, %payload, "schedule");
        self.queue.push(Event::new(id, at, payload));
        id
    }

    /// Remove and return the earliest event.
    pub fn pop_next(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    pub fn peek_next(&self) -> Option<&Event> {
        self.queue.peek()
    }

    /// Timestamp of the earliest pending event.
    pub fn next_time(&self) -> Option<VirtualTime> {
        self.queue.peek().map(|e| e.scheduled_at)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Events ever scheduled, dispatched or not.
    pub fn scheduled_total(&self) -> u64 {
        self.ids.peek().raw()
    }
}
