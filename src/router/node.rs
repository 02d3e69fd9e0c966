//! `RouterNode`: a policy plus a FIFO processing queue.

use std::collections::VecDeque;

use crate::policy::RoutingPolicy;
use crate::time::VirtualTime;
use crate::topology::NodeId;

use super::packet::PacketId;

/// One router. Packets are processed one at a time in arrival order, each
/// taking `pkg_process_delay`.
pub struct RouterNode {
    id: NodeId,
    policy: Box<dyn RoutingPolicy>,
    queue: VecDeque<PacketId>,
    /// When the last queued packet finishes processing.
    busy_until: VirtualTime,
}

impl RouterNode {
    pub fn new(id: NodeId, policy: Box<dyn RoutingPolicy>) -> Self {
        RouterNode {
            id,
            policy,
            queue: VecDeque::new(),
            busy_until: VirtualTime::ZERO,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn policy(&self) -> &dyn RoutingPolicy {
        self.policy.as_ref()
    }

    pub fn policy_mut(&mut self) -> &mut dyn RoutingPolicy {
        self.policy.as_mut()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn busy_until(&self) -> VirtualTime {
        self.busy_until
    }

    /// Queue `packet` and return when its processing completes:
    /// `max(now, busy_until) + process_delay`.
    pub fn enqueue(
        &mut self,
        packet: PacketId,
        now: VirtualTime,
        process_delay: f64,
    ) -> VirtualTime {
        let start = self.busy_until.max(now);
        let done = start.plus(process_delay).unwrap_or(start);
        self.busy_until = done;
        self.queue.push_back(packet);
        done
    }

    /// Take `packet` off the queue once its processing completed.
    pub fn dequeue(&mut self, packet: PacketId) -> bool {
        if self.queue.front() == Some(&packet) {
            self.queue.pop_front();
            return true;
        }
        match self.queue.iter().position(|&p| p == packet) {
            Some(i) => {
                self.queue.remove(i);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for RouterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterNode")
            .field("id", &self.id)
            .field("policy", &self.policy.kind())
            .field("queue", &self.queue)
            .field("busy_until", &self.busy_until)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::LinkStatePolicy;
    use crate::topology::Graph;
    use std::rc::Rc;

    fn node() -> RouterNode {
        let n = NodeId::new;
        let graph = Rc::new(Graph::from_edges(2, [(n(0), n(1), 1.0)]).unwrap());
        RouterNode::new(n(0), Box::new(LinkStatePolicy::new(n(0), graph)))
    }

    #[test]
    fn test_fifo_completion_times() {
        let mut r = node();
        let t = VirtualTime::new(10.0);
        assert_eq!(r.enqueue(PacketId::new(0), t, 5.0), VirtualTime::new(15.0));
        assert_eq!(r.enqueue(PacketId::new(1), t, 5.0), VirtualTime::new(20.0));
        // Idle again by t=30: processing starts immediately.
        assert_eq!(
            r.enqueue(PacketId::new(2), VirtualTime::new(30.0), 5.0),
            VirtualTime::new(35.0)
        );
        assert_eq!(r.queue_len(), 3);
        assert!(r.dequeue(PacketId::new(0)));
        assert!(!r.dequeue(PacketId::new(0)));
        assert_eq!(r.queue_len(), 2);
    }

    #[test]
    fn test_zero_delay_keeps_order() {
        let mut r = node();
        let t = VirtualTime::new(1.0);
        assert_eq!(r.enqueue(PacketId::new(0), t, 0.0), t);
        assert_eq!(r.enqueue(PacketId::new(1), t, 0.0), t);
    }
}
