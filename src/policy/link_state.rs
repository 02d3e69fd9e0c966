//! Link-state baseline: shortest latency path over the links currently up.

use std::collections::BTreeSet;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::{parse_state, DecisionRequest, PolicyKind, RoutingPolicy, Transition, UpdateOutcome};
use crate::error::RouteResult;
use crate::topology::{edge_key, Graph, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LinkStateState {
    down: Vec<(NodeId, NodeId)>,
}

#[derive(Debug, Clone)]
pub struct LinkStatePolicy {
    node: NodeId,
    graph: Rc<Graph>,
    down: BTreeSet<(NodeId, NodeId)>,
}

impl LinkStatePolicy {
    pub fn new(node: NodeId, graph: Rc<Graph>) -> Self {
        LinkStatePolicy {
            node,
            graph,
            down: BTreeSet::new(),
        }
    }

    fn path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        self.graph
            .shortest_path(from, to, |u, v| !self.down.contains(&edge_key(u, v)))
    }

    fn path_cost(&self, path: &[NodeId]) -> f64 {
        path.windows(2)
            .map(|w| self.graph.latency(w[0], w[1]).unwrap_or(f64::INFINITY))
            .sum()
    }
}

impl RoutingPolicy for LinkStatePolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::LinkState
    }

    fn decide(&mut self, req: &DecisionRequest) -> NodeId {
        self.path(req.node, req.destination)
            .and_then(|p| p.get(1).copied())
            .filter(|y| req.neighbors.contains(y))
            .unwrap_or(req.neighbors[0])
    }

    fn update(&mut self, _transition: &Transition, _reward: f64) -> UpdateOutcome {
        UpdateOutcome::Ignored
    }

    /// Latency of the current shortest path; infinite if unreachable.
    fn estimate(&mut self, req: &DecisionRequest) -> f64 {
        self.path(req.node, req.destination)
            .map_or(f64::INFINITY, |p| self.path_cost(&p))
    }

    fn on_link_change(&mut self, u: NodeId, v: NodeId, alive: bool) {
        if alive {
            self.down.remove(&edge_key(u, v));
        } else {
            self.down.insert(edge_key(u, v));
        }
        tracing::trace!(node = %self.node, %u, %v, alive, "link-state view updated");
    }

    fn export_state(&self) -> RouteResult<String> {
        let state = LinkStateState {
            down: self.down.iter().copied().collect(),
        };
        Ok(serde_json::to_string(&state)?)
    }

    fn import_state(&mut self, state: &str) -> RouteResult<()> {
        let state: LinkStateState = parse_state(self.kind(), state)?;
        self.down = state.down.into_iter().map(|(u, v)| edge_key(u, v)).collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::packet::PacketId;
    use crate::time::VirtualTime;

    fn n(i: u64) -> NodeId {
        NodeId::new(i)
    }

    /// Square 0-1-3 (cheap) and 0-2-3 (expensive).
    fn square() -> Rc<Graph> {
        Rc::new(
            Graph::from_edges(
                4,
                [
                    (n(0), n(1), 1.0),
                    (n(1), n(3), 1.0),
                    (n(0), n(2), 4.0),
                    (n(2), n(3), 4.0),
                ],
            )
            .unwrap(),
        )
    }

    fn request(neighbors: &[NodeId]) -> DecisionRequest<'_> {
        DecisionRequest {
            packet: PacketId::new(0),
            node: n(0),
            destination: n(3),
            neighbors,
            features: None,
            now: VirtualTime::ZERO,
        }
    }

    #[test]
    fn test_follows_shortest_path() {
        let mut p = LinkStatePolicy::new(n(0), square());
        let ns = [n(1), n(2)];
        assert_eq!(p.decide(&request(&ns)), n(1));
        assert_eq!(p.estimate(&request(&ns)), 2.0);
    }

    #[test]
    fn test_reroutes_around_broken_link() {
        let mut p = LinkStatePolicy::new(n(0), square());
        p.on_link_change(n(3), n(1), false);
        let ns = [n(1), n(2)];
        assert_eq!(p.decide(&request(&ns)), n(2));
        assert_eq!(p.estimate(&request(&ns)), 8.0);

        p.on_link_change(n(1), n(3), true);
        assert_eq!(p.decide(&request(&ns)), n(1));
    }

    #[test]
    fn test_learns_nothing() {
        let mut p = LinkStatePolicy::new(n(0), square());
        let t = Transition {
            packet: PacketId::new(0),
            node: n(0),
            destination: n(3),
            action: n(1),
            hop_delay: 1.0,
            next_estimate: 1.0,
            terminal: false,
            features: None,
            now: VirtualTime::ZERO,
        };
        assert_eq!(p.update(&t, -1.0), UpdateOutcome::Ignored);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut a = LinkStatePolicy::new(n(0), square());
        a.on_link_change(n(1), n(3), false);
        let mut b = LinkStatePolicy::new(n(0), square());
        b.import_state(&a.export_state().unwrap()).unwrap();
        let ns = [n(1), n(2)];
        assert_eq!(b.decide(&request(&ns)), n(2));
    }
}
