//! Packets and their life cycle.

use serde::{Deserialize, Serialize};

use crate::error::DropReason;
use crate::time::VirtualTime;
use crate::topology::NodeId;

/// A packet identifier, unique within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PacketId(u64);

impl PacketId {
    #[inline]
    pub fn new(id: u64) -> Self {
        PacketId(id)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PacketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// `Created → Queued → Decided → InTransit → Queued → … → Delivered | Dropped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketState {
    Created,
    Queued,
    Decided,
    InTransit,
    Delivered,
    Dropped(DropReason),
}

impl PacketState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PacketState::Delivered | PacketState::Dropped(_))
    }
}

/// Where a packet currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// At (or waiting to be processed by) a node.
    Node(NodeId),
    /// Traversing the link `from → to`.
    InTransit { from: NodeId, to: NodeId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: PacketId,
    pub source: NodeId,
    pub destination: NodeId,
    pub created_at: VirtualTime,
    /// Index of the traffic segment that produced this packet.
    pub episode: usize,
    pub location: Location,
    /// Nodes visited so far, source first.
    pub path: Vec<NodeId>,
    pub hops: u32,
    /// When the packet reached the node it is currently at.
    pub arrival_at: VirtualTime,
    pub state: PacketState,
    /// Time of delivery or drop.
    pub finished_at: Option<VirtualTime>,
}

impl Packet {
    pub fn new(
        id: PacketId,
        source: NodeId,
        destination: NodeId,
        created_at: VirtualTime,
        episode: usize,
    ) -> Self {
        Packet {
            id,
            source,
            destination,
            created_at,
            episode,
            location: Location::Node(source),
            path: vec![source],
            hops: 0,
            arrival_at: created_at,
            state: PacketState::Created,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The packet joins the FIFO of the node it is at.
    pub fn enqueue(&mut self, node: NodeId, now: VirtualTime) {
        debug_assert!(!self.is_terminal(), "{} enqueued after termination", self.id);
        if let Location::InTransit { to, .. } = self.location {
            debug_assert_eq!(to, node);
            self.path.push(node);
            self.hops += 1;
        }
        self.location = Location::Node(node);
        self.arrival_at = now;
        self.state = PacketState::Queued;
    }

    pub fn mark_decided(&mut self) {
        self.state = PacketState::Decided;
    }

    pub fn depart(&mut self, from: NodeId, to: NodeId) {
        self.location = Location::InTransit { from, to };
        self.state = PacketState::InTransit;
    }

    /// The packet reached its destination. Returns `false` if it had
    /// already terminated.
    pub fn deliver(&mut self, now: VirtualTime) -> bool {
        if self.is_terminal() {
            return false;
        }
        if let Location::InTransit { to, .. } = self.location {
            self.path.push(to);
            self.hops += 1;
            self.location = Location::Node(to);
        }
        self.state = PacketState::Delivered;
        self.finished_at = Some(now);
        true
    }

    /// Drop the packet. Returns `false` if it had already terminated.
    pub fn drop_with(&mut self, reason: DropReason, now: VirtualTime) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.state = PacketState::Dropped(reason);
        self.finished_at = Some(now);
        true
    }

    /// End-to-end latency, once terminal.
    pub fn latency(&self) -> Option<f64> {
        self.finished_at
            .and_then(|t| t.duration_since(self.created_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> Packet {
        Packet::new(
            PacketId::new(1),
            NodeId::new(0),
            NodeId::new(2),
            VirtualTime::new(1.0),
            0,
        )
    }

    #[test]
    fn test_life_cycle() {
        let mut p = packet();
        assert_eq!(p.state, PacketState::Created);
        p.enqueue(NodeId::new(0), VirtualTime::new(1.0));
        assert_eq!(p.hops, 0);
        p.mark_decided();
        p.depart(NodeId::new(0), NodeId::new(1));
        p.enqueue(NodeId::new(1), VirtualTime::new(3.0));
        assert_eq!(p.hops, 1);
        assert_eq!(p.arrival_at, VirtualTime::new(3.0));
        p.depart(NodeId::new(1), NodeId::new(2));
        assert!(p.deliver(VirtualTime::new(6.0)));
        assert_eq!(p.path, vec![NodeId::new(0), NodeId::new(1), NodeId::new(2)]);
        assert_eq!(p.hops, 2);
        assert_eq!(p.latency(), Some(5.0));
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut p = packet();
        assert!(p.drop_with(DropReason::RoutingDeadEnd, VirtualTime::new(2.0)));
        assert!(!p.drop_with(DropReason::HopLimitExceeded, VirtualTime::new(3.0)));
        assert!(!p.deliver(VirtualTime::new(4.0)));
        assert_eq!(p.state, PacketState::Dropped(DropReason::RoutingDeadEnd));
        assert_eq!(p.finished_at, Some(VirtualTime::new(2.0)));
    }

    #[test]
    fn test_display() {
        assert_eq!(PacketId::new(9).to_string(), "P9");
    }
}
