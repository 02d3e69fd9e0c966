/// Events of a routing run.
///
/// A packet's life is a chain of events: injection, processing at each
/// node, arrival over each link. Link failures are events too, so the
/// whole run is one totally ordered sequence.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::router::packet::PacketId;
use crate::time::VirtualTime;
use crate::topology::NodeId;

// ── Event ID ──────────────────────────────────────────────────────────

/// Position of an event in scheduling order; breaks timestamp ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        EventId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E#{}", self.0)
    }
}

/// Hands out `E#0, E#1, …`. One per scheduler.
#[derive(Debug, Clone, Default)]
pub struct EventIdGen {
    next: u64,
}

impl EventIdGen {
    pub fn new() -> Self {
        EventIdGen { next: 0 }
    }

    pub fn next_id(&mut self) -> EventId {
        let id = EventId(self.next);
        self.next += 1;
        id
    }

    /// The id the next call to [`next_id`](Self::next_id) returns.
    pub fn peek(&self) -> EventId {
        EventId(self.next)
    }
}

// ── Event Type ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// A packet is injected at its source node.
    PacketArrival { packet: PacketId },

    /// `node` finished processing `packet` and must pick a next hop.
    ProcessingComplete { node: NodeId, packet: PacketId },

    /// `packet` reached `to` over the link from `from`.
    LinkArrival {
        from: NodeId,
        to: NodeId,
        packet: PacketId,
    },

    LinkBreak { u: NodeId, v: NodeId },

    LinkRestore { u: NodeId, v: NodeId },
}

impl EventType {
    /// The packet this event moves, if any.
    pub fn packet(&self) -> Option<PacketId> {
        match *self {
            EventType::PacketArrival { packet }
            | EventType::ProcessingComplete { packet, .. }
            | EventType::LinkArrival { packet, .. } => Some(packet),
            EventType::LinkBreak { .. } | EventType::LinkRestore { .. } => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::PacketArrival { packet } => write!(f, "Arrival({})", packet),
            EventType::ProcessingComplete { node, packet } => {
                write!(f, "Processed({} @ {})", packet, node)
            }
            EventType::LinkArrival { from, to, packet } => {
                write!(f, "Link({} → {}, {})", from, to, packet)
            }
            EventType::LinkBreak { u, v } => write!(f, "Break({} ↔ {})", u, v),
            EventType::LinkRestore { u, v } => write!(f, "Restore({} ↔ {})", u, v),
        }
    }
}

// ── Event ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Event {
    pub id: EventId,
    pub scheduled_at: VirtualTime,
    pub payload: EventType,
}

impl Event {
    pub fn new(id: EventId, scheduled_at: VirtualTime, payload: EventType) -> Self {
        Event {
            id,
            scheduled_at,
            payload,
        }
    }
}

/// Reversed on `(scheduled_at, id)` so `BinaryHeap` pops the earliest.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.scheduled_at, other.id).cmp(&(self.scheduled_at, self.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
