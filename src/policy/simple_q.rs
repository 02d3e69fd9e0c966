//! Tabular Q-routing.

use std::collections::BTreeMap;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::{
    argmin, explore_or, parse_state, DecisionRequest, Exploration, PolicyKind, RoutingPolicy,
    SkipReason, Transition, UpdateOutcome,
};
use crate::error::RouteResult;
use crate::topology::NodeId;

/// Initial cost of forwarding straight to the destination.
pub const INITIAL_DIRECT: f64 = 40.0;
/// Initial cost of every other neighbor.
pub const INITIAL_INDIRECT: f64 = 100500.0;

/// Initial value of `Q[destination][neighbor]`.
pub fn initial_value(destination: NodeId, neighbor: NodeId) -> f64 {
    if neighbor == destination {
        INITIAL_DIRECT
    } else {
        INITIAL_INDIRECT
    }
}

/// One learned table cell, the unit of exported state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub destination: NodeId,
    pub neighbor: NodeId,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SimpleQState {
    decisions: u64,
    rng: ChaCha8Rng,
    table: Vec<QEntry>,
}

/// `Q[d][y]`: estimated time to deliver a packet for `d` via neighbor `y`.
///
/// Cells are materialised lazily; an untouched cell holds its initial
/// value.
#[derive(Debug, Clone)]
pub struct SimpleQ {
    table: BTreeMap<(NodeId, NodeId), f64>,
    learning_rate: f64,
    exploration: Exploration,
    decisions: u64,
    rng: ChaCha8Rng,
}

impl SimpleQ {
    pub fn new(learning_rate: f64, exploration: Exploration, rng: ChaCha8Rng) -> Self {
        SimpleQ {
            table: BTreeMap::new(),
            learning_rate,
            exploration,
            decisions: 0,
            rng,
        }
    }

    pub fn q(&self, destination: NodeId, neighbor: NodeId) -> f64 {
        self.table
            .get(&(destination, neighbor))
            .copied()
            .unwrap_or_else(|| initial_value(destination, neighbor))
    }
}

impl RoutingPolicy for SimpleQ {
    fn kind(&self) -> PolicyKind {
        PolicyKind::SimpleQ
    }

    fn decide(&mut self, req: &DecisionRequest) -> NodeId {
        let epsilon = self.exploration.epsilon(self.decisions);
        self.decisions += 1;
        let table = &self.table;
        explore_or(&mut self.rng, epsilon, req.neighbors, || {
            argmin(req.neighbors, |y| {
                table
                    .get(&(req.destination, y))
                    .copied()
                    .unwrap_or_else(|| initial_value(req.destination, y))
            })
        })
    }

    fn update(&mut self, t: &Transition, reward: f64) -> UpdateOutcome {
        let old = self.q(t.destination, t.action);
        let new = old + self.learning_rate * (t.target(reward) - old);
        if !new.is_finite() {
            tracing::warn!(node = %t.node, packet = %t.packet, "non-finite Q update skipped");
            return UpdateOutcome::Skipped(SkipReason::NumericInstability);
        }
        self.table.insert((t.destination, t.action), new);
        UpdateOutcome::Applied
    }

    fn estimate(&mut self, req: &DecisionRequest) -> f64 {
        req.neighbors
            .iter()
            .map(|&y| self.q(req.destination, y))
            .fold(f64::INFINITY, f64::min)
    }

    fn export_state(&self) -> RouteResult<String> {
        let state = SimpleQState {
            decisions: self.decisions,
            rng: self.rng.clone(),
            table: self
                .table
                .iter()
                .map(|(&(destination, neighbor), &value)| QEntry {
                    destination,
                    neighbor,
                    value,
                })
                .collect(),
        };
        Ok(serde_json::to_string(&state)?)
    }

    fn import_state(&mut self, state: &str) -> RouteResult<()> {
        let state: SimpleQState = parse_state(self.kind(), state)?;
        self.decisions = state.decisions;
        self.rng = state.rng;
        self.table = state
            .table
            .into_iter()
            .map(|e| ((e.destination, e.neighbor), e.value))
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::packet::PacketId;
    use crate::time::VirtualTime;
    use rand::SeedableRng;

    fn n(i: u64) -> NodeId {
        NodeId::new(i)
    }

    fn policy(exploration: Exploration) -> SimpleQ {
        SimpleQ::new(0.5, exploration, ChaCha8Rng::seed_from_u64(3))
    }

    fn request(neighbors: &[NodeId], destination: NodeId) -> DecisionRequest<'_> {
        DecisionRequest {
            packet: PacketId::new(0),
            node: n(0),
            destination,
            neighbors,
            features: None,
            now: VirtualTime::ZERO,
        }
    }

    fn hop(action: NodeId, destination: NodeId, delay: f64, next: f64) -> Transition<'static> {
        Transition {
            packet: PacketId::new(0),
            node: n(0),
            destination,
            action,
            hop_delay: delay,
            next_estimate: next,
            terminal: action == destination,
            features: None,
            now: VirtualTime::ZERO,
        }
    }

    #[test]
    fn test_initial_values_prefer_destination() {
        let mut p = policy(Exploration::greedy());
        let ns = [n(1), n(2), n(3)];
        assert_eq!(p.q(n(3), n(3)), INITIAL_DIRECT);
        assert_eq!(p.q(n(3), n(1)), INITIAL_INDIRECT);
        assert_eq!(p.decide(&request(&ns, n(3))), n(3));
        assert_eq!(p.estimate(&request(&ns, n(3))), INITIAL_DIRECT);
    }

    #[test]
    fn test_update_moves_toward_target() {
        let mut p = policy(Exploration::greedy());
        // Target is the hop delay since the neighbor is the destination.
        assert_eq!(p.update(&hop(n(1), n(1), 20.0, 0.0), -20.0), UpdateOutcome::Applied);
        assert_eq!(p.q(n(1), n(1)), 30.0);
        p.update(&hop(n(1), n(1), 20.0, 0.0), -20.0);
        assert_eq!(p.q(n(1), n(1)), 25.0);
    }

    #[test]
    fn test_bootstrap_from_next_estimate() {
        let mut p = policy(Exploration::greedy());
        p.update(&hop(n(2), n(5), 10.0, 90.0), -10.0);
        assert_eq!(p.q(n(5), n(2)), INITIAL_INDIRECT + 0.5 * (100.0 - INITIAL_INDIRECT));
    }

    #[test]
    fn test_nan_update_is_skipped() {
        let mut p = policy(Exploration::greedy());
        let outcome = p.update(&hop(n(1), n(1), f64::NAN, 0.0), f64::NAN);
        assert_eq!(outcome, UpdateOutcome::Skipped(SkipReason::NumericInstability));
        assert_eq!(p.q(n(1), n(1)), INITIAL_DIRECT);
    }

    #[test]
    fn test_exploring_decisions_stay_in_neighbor_set() {
        let mut p = policy(Exploration::uniform());
        let ns = [n(4), n(6), n(9)];
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            let y = p.decide(&request(&ns, n(9)));
            assert!(ns.contains(&y));
            seen.insert(y);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_state_roundtrip_preserves_decisions() {
        let mut a = policy(Exploration::greedy());
        a.update(&hop(n(2), n(3), 5.0, 10.0), -5.0);
        a.update(&hop(n(1), n(3), 5.0, 200_000.0), -5.0);
        let json = a.export_state().unwrap();

        let mut b = policy(Exploration::greedy());
        b.import_state(&json).unwrap();
        let ns = [n(1), n(2), n(3)];
        for d in [n(3), n(4)] {
            assert_eq!(a.decide(&request(&ns, d)), b.decide(&request(&ns, d)));
        }
        assert_eq!(a.q(n(3), n(2)), b.q(n(3), n(2)));
    }

    #[test]
    fn test_state_roundtrip_continues_exploration() {
        let ns = [n(1), n(2), n(3)];
        let mut a = policy(Exploration::uniform());
        for _ in 0..10 {
            a.decide(&request(&ns, n(3)));
        }
        let mut b = SimpleQ::new(0.5, Exploration::uniform(), ChaCha8Rng::seed_from_u64(3));
        b.import_state(&a.export_state().unwrap()).unwrap();

        let ours: Vec<NodeId> = (0..20).map(|_| a.decide(&request(&ns, n(3)))).collect();
        let theirs: Vec<NodeId> = (0..20).map(|_| b.decide(&request(&ns, n(3)))).collect();
        assert_eq!(ours, theirs);
    }

    #[test]
    fn test_import_rejects_garbage() {
        let mut p = policy(Exploration::greedy());
        assert!(matches!(
            p.import_state("{\"nope\": 1}"),
            Err(crate::error::RouteError::State(_))
        ));
    }
}
