//! One routing decision, recorded when hop tracing is on.

use serde::{Deserialize, Serialize};

use crate::event::EventId;
use crate::time::VirtualTime;
use crate::topology::NodeId;

use super::packet::PacketId;

/// A routing decision taken by a node.
///
/// Appended by the environment on every forwarded packet when
/// `settings.router_env.full_log` is set; handy for test assertions and
/// post-mortem inspection of the paths a policy chose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopRecord {
    /// Virtual time of the decision.
    pub time: VirtualTime,
    /// The `ProcessingComplete` event that triggered it.
    pub event_id: EventId,
    pub packet: PacketId,
    pub node: NodeId,
    pub next: NodeId,
    pub destination: NodeId,
    /// Packets still waiting at `node` after this one left.
    pub queue_len: usize,
}

impl std::fmt::Display for HopRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} {} {}] {} → {} (dst {}, queue {})",
            self.time,
            self.event_id,
            self.packet,
            self.node,
            self.next,
            self.destination,
            self.queue_len,
        )
    }
}
