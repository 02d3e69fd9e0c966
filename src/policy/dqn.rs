//! Deep Q-routing.
//!
//! One network per node approximates the cost of forwarding through each
//! neighbor. Two head layouts exist:
//!
//! - **Joint**: one forward pass yields a value for every node id; the
//!   output is masked to the live neighbors. Used by `dqn` and `dqn_emb`.
//! - **OneOut**: the candidate neighbor is appended to the input as a
//!   one-hot block and the network returns a single value, so a decision
//!   costs one pass per neighbor. Used by `dqn_oneout`.
//!
//! Feedback goes to a replay buffer; a training step on a sampled batch
//! runs as soon as the buffer holds `min(batch_size, mem_capacity)`
//! experiences.

use ndarray::Array2;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::replay::{Experience, ReplayBuffer};
use super::{
    argmin, explore_or, parse_state, DecisionRequest, Exploration, PolicyKind, RoutingPolicy,
    SkipReason, Transition, UpdateOutcome,
};
use crate::config::DqnSettings;
use crate::error::{RouteError, RouteResult};
use crate::nn::Mlp;
use crate::topology::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DqnHead {
    Joint,
    OneOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DqnState {
    kind: PolicyKind,
    head: DqnHead,
    decisions: u64,
    rng: ChaCha8Rng,
    net: Mlp,
    replay: ReplayBuffer,
}

#[derive(Debug, Clone)]
pub struct DqnPolicy {
    kind: PolicyKind,
    head: DqnHead,
    net: Mlp,
    replay: ReplayBuffer,
    batch_size: usize,
    exploration: Exploration,
    nodes: usize,
    feature_len: usize,
    decisions: u64,
    rng: ChaCha8Rng,
}

impl DqnPolicy {
    pub fn new(
        kind: PolicyKind,
        head: DqnHead,
        settings: &DqnSettings,
        feature_len: usize,
        nodes: usize,
        mut rng: ChaCha8Rng,
    ) -> Self {
        let (input, output) = match head {
            DqnHead::Joint => (feature_len, nodes),
            DqnHead::OneOut => (feature_len + nodes, 1),
        };
        let net = Mlp::new(
            input,
            &settings.layers,
            output,
            settings.activation,
            settings.optimizer,
            settings.learning_rate,
            &mut rng,
        );
        DqnPolicy {
            kind,
            head,
            net,
            replay: ReplayBuffer::new(settings.mem_capacity),
            batch_size: settings.batch_size,
            exploration: settings.exploration,
            nodes,
            feature_len,
            decisions: 0,
            rng,
        }
    }

    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    fn input(&self, features: Option<&[f64]>) -> Option<Vec<f64>> {
        features
            .filter(|f| f.len() == self.feature_len)
            .map(<[f64]>::to_vec)
    }

    /// Input for a decision; a vector of the wrong size is replaced by
    /// zeros so the node can still forward.
    fn input_or_zeros(&self, node: NodeId, features: Option<&[f64]>) -> Vec<f64> {
        self.input(features).unwrap_or_else(|| {
            tracing::warn!(
                %node,
                expected = self.feature_len,
                got = features.map_or(0, <[f64]>::len),
                "feature vector does not fit the network, using zeros"
            );
            vec![0.0; self.feature_len]
        })
    }

    /// Network input for evaluating `action` under the OneOut head.
    fn with_candidate(&self, features: &[f64], action: usize) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.feature_len + self.nodes);
        row.extend_from_slice(features);
        let start = row.len();
        row.resize(start + self.nodes, 0.0);
        row[start + action] = 1.0;
        row
    }

    /// Estimated cost via each neighbor, in neighbor order.
    fn values(&self, features: &[f64], neighbors: &[NodeId]) -> Vec<f64> {
        match self.head {
            DqnHead::Joint => {
                let out = self.net.forward(features);
                neighbors.iter().map(|y| out[y.index()]).collect()
            }
            DqnHead::OneOut => {
                let rows: Vec<f64> = neighbors
                    .iter()
                    .flat_map(|y| self.with_candidate(features, y.index()))
                    .collect();
                let width = self.feature_len + self.nodes;
                match Array2::from_shape_vec((neighbors.len(), width), rows) {
                    Ok(x) => self.net.forward_batch(&x).column(0).to_vec(),
                    Err(_) => vec![f64::INFINITY; neighbors.len()],
                }
            }
        }
    }

    fn train_batch(&mut self) -> Option<f64> {
        let k = self.batch_size.min(self.replay.len());
        let batch = self.replay.sample(&mut self.rng, k);
        let (width, rows, selected): (usize, Vec<f64>, Vec<usize>) = match self.head {
            DqnHead::Joint => (
                self.feature_len,
                batch.iter().flat_map(|e| e.features.iter().copied()).collect(),
                batch.iter().map(|e| e.action).collect(),
            ),
            DqnHead::OneOut => (
                self.feature_len + self.nodes,
                batch
                    .iter()
                    .flat_map(|e| self.with_candidate(&e.features, e.action))
                    .collect(),
                vec![0; batch.len()],
            ),
        };
        let targets: Vec<f64> = batch.iter().map(|e| e.target()).collect();
        let x = Array2::from_shape_vec((batch.len(), width), rows).ok()?;
        self.net.train(&x, &selected, &targets)
    }
}

impl RoutingPolicy for DqnPolicy {
    fn kind(&self) -> PolicyKind {
        self.kind
    }

    fn decide(&mut self, req: &DecisionRequest) -> NodeId {
        let epsilon = self.exploration.epsilon(self.decisions);
        self.decisions += 1;
        let features = self.input_or_zeros(req.node, req.features);
        let values = self.values(&features, req.neighbors);
        explore_or(&mut self.rng, epsilon, req.neighbors, || {
            argmin(req.neighbors, |y| {
                req.neighbors
                    .iter()
                    .position(|&n| n == y)
                    .map_or(f64::INFINITY, |i| values[i])
            })
        })
    }

    fn update(&mut self, t: &Transition, reward: f64) -> UpdateOutcome {
        if !(reward.is_finite() && t.next_estimate.is_finite()) || t.action.index() >= self.nodes {
            tracing::warn!(node = %t.node, packet = %t.packet, "unusable DQN feedback skipped");
            return UpdateOutcome::Skipped(SkipReason::NumericInstability);
        }
        let Some(features) = self.input(t.features) else {
            tracing::warn!(
                node = %t.node,
                packet = %t.packet,
                expected = self.feature_len,
                got = t.features.map_or(0, <[f64]>::len),
                "feedback without usable features skipped"
            );
            return UpdateOutcome::Skipped(SkipReason::FeatureMismatch);
        };
        self.replay.push(Experience {
            features,
            action: t.action.index(),
            reward,
            next_estimate: t.next_estimate,
            terminal: t.terminal,
        });

        if self.replay.len() < self.batch_size.min(self.replay.capacity()) {
            return UpdateOutcome::Buffered;
        }
        match self.train_batch() {
            Some(loss) => {
                tracing::trace!(node = %t.node, loss, "dqn training step");
                UpdateOutcome::Applied
            }
            None => {
                tracing::warn!(
                    node = %t.node,
                    packet = %t.packet,
                    "non-finite DQN gradient, step skipped"
                );
                UpdateOutcome::Skipped(SkipReason::NumericInstability)
            }
        }
    }

    fn estimate(&mut self, req: &DecisionRequest) -> f64 {
        let features = self.input_or_zeros(req.node, req.features);
        self.values(&features, req.neighbors)
            .into_iter()
            .fold(f64::INFINITY, f64::min)
    }

    fn export_state(&self) -> RouteResult<String> {
        let state = DqnState {
            kind: self.kind,
            head: self.head,
            decisions: self.decisions,
            rng: self.rng.clone(),
            net: self.net.clone(),
            replay: self.replay.clone(),
        };
        Ok(serde_json::to_string(&state)?)
    }

    fn import_state(&mut self, state: &str) -> RouteResult<()> {
        let state: DqnState = parse_state(self.kind, state)?;
        if state.kind != self.kind
            || state.head != self.head
            || state.net.input_len() != self.net.input_len()
            || state.net.output_len() != self.net.output_len()
        {
            return Err(RouteError::State(format!(
                "{} state does not match this network ({} inputs, {} outputs)",
                state.kind,
                self.net.input_len(),
                self.net.output_len()
            )));
        }
        self.decisions = state.decisions;
        self.rng = state.rng;
        self.net = state.net;
        self.replay = state.replay;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Activation, OptimizerKind};
    use crate::router::packet::PacketId;
    use crate::time::VirtualTime;
    use rand::SeedableRng;

    const NODES: usize = 4;
    const FEATURES: usize = 2 * NODES;

    fn n(i: u64) -> NodeId {
        NodeId::new(i)
    }

    fn settings(batch_size: usize, mem_capacity: usize, exploration: Exploration) -> DqnSettings {
        DqnSettings {
            optimizer: OptimizerKind::Adam,
            activation: Activation::Relu,
            layers: vec![16],
            additional_inputs: Vec::new(),
            batch_size,
            mem_capacity,
            learning_rate: 0.01,
            exploration,
        }
    }

    fn policy(head: DqnHead, batch: usize, capacity: usize, exploration: Exploration) -> DqnPolicy {
        let kind = match head {
            DqnHead::Joint => PolicyKind::Dqn,
            DqnHead::OneOut => PolicyKind::DqnOneOut,
        };
        DqnPolicy::new(
            kind,
            head,
            &settings(batch, capacity, exploration),
            FEATURES,
            NODES,
            ChaCha8Rng::seed_from_u64(5),
        )
    }

    fn features() -> Vec<f64> {
        let mut f = vec![0.0; FEATURES];
        f[0] = 1.0;
        f[NODES + 3] = 1.0;
        f
    }

    fn request<'a>(neighbors: &'a [NodeId], f: &'a [f64]) -> DecisionRequest<'a> {
        DecisionRequest {
            packet: PacketId::new(0),
            node: n(0),
            destination: n(3),
            neighbors,
            features: Some(f),
            now: VirtualTime::ZERO,
        }
    }

    fn hop<'a>(action: NodeId, f: &'a [f64], reward: f64) -> Transition<'a> {
        Transition {
            packet: PacketId::new(0),
            node: n(0),
            destination: n(3),
            action,
            hop_delay: -reward,
            next_estimate: 0.0,
            terminal: true,
            features: Some(f),
            now: VirtualTime::ZERO,
        }
    }

    #[test]
    fn test_decisions_stay_in_neighbor_set() {
        let f = features();
        let ns = [n(1), n(3)];
        for head in [DqnHead::Joint, DqnHead::OneOut] {
            for exploration in [Exploration::uniform(), Exploration::greedy()] {
                let mut p = policy(head, 1, 1, exploration);
                for _ in 0..50 {
                    assert!(ns.contains(&p.decide(&request(&ns, &f))));
                }
            }
        }
    }

    #[test]
    fn test_capacity_one_trains_every_hop() {
        let f = features();
        let mut p = policy(DqnHead::Joint, 1, 1, Exploration::greedy());
        for _ in 0..3 {
            assert_eq!(p.update(&hop(n(3), &f, -10.0), -10.0), UpdateOutcome::Applied);
        }
        assert_eq!(p.replay_len(), 1);
    }

    #[test]
    fn test_buffers_until_batch_is_available() {
        let f = features();
        let mut p = policy(DqnHead::OneOut, 4, 16, Exploration::greedy());
        for _ in 0..3 {
            assert_eq!(p.update(&hop(n(1), &f, -10.0), -10.0), UpdateOutcome::Buffered);
        }
        assert_eq!(p.update(&hop(n(1), &f, -10.0), -10.0), UpdateOutcome::Applied);
    }

    #[test]
    fn test_learning_moves_estimate_toward_target() {
        let f = features();
        let ns = [n(3)];
        for head in [DqnHead::Joint, DqnHead::OneOut] {
            let mut p = policy(head, 1, 1, Exploration::greedy());
            let before = (p.estimate(&request(&ns, &f)) - 10.0).abs();
            for _ in 0..300 {
                p.update(&hop(n(3), &f, -10.0), -10.0);
            }
            let after = (p.estimate(&request(&ns, &f)) - 10.0).abs();
            assert!(after < before * 0.5, "{:?}: error {} -> {}", head, before, after);
        }
    }

    #[test]
    fn test_nan_reward_is_skipped() {
        let f = features();
        let mut p = policy(DqnHead::Joint, 1, 1, Exploration::greedy());
        assert_eq!(
            p.update(&hop(n(3), &f, f64::NAN), f64::NAN),
            UpdateOutcome::Skipped(SkipReason::NumericInstability)
        );
        assert_eq!(p.replay_len(), 0);
    }

    #[test]
    fn test_state_roundtrip() {
        let f = features();
        let ns = [n(1), n(3)];
        let mut a = policy(DqnHead::Joint, 1, 1, Exploration::greedy());
        a.update(&hop(n(3), &f, -10.0), -10.0);
        let json = a.export_state().unwrap();

        let mut b = policy(DqnHead::Joint, 1, 1, Exploration::greedy());
        b.import_state(&json).unwrap();
        assert_eq!(a.estimate(&request(&ns, &f)), b.estimate(&request(&ns, &f)));
        assert_eq!(a.decide(&request(&ns, &f)), b.decide(&request(&ns, &f)));
    }

    #[test]
    fn test_state_roundtrip_continues_exploration_and_sampling() {
        let f = features();
        let ns = [n(1), n(2), n(3)];
        for head in [DqnHead::Joint, DqnHead::OneOut] {
            let mut a = policy(head, 2, 8, Exploration::uniform());
            for _ in 0..5 {
                let y = a.decide(&request(&ns, &f));
                a.update(&hop(y, &f, -10.0), -10.0);
            }
            let mut b = policy(head, 2, 8, Exploration::uniform());
            b.import_state(&a.export_state().unwrap()).unwrap();
            for _ in 0..20 {
                let (ya, yb) = (a.decide(&request(&ns, &f)), b.decide(&request(&ns, &f)));
                assert_eq!(ya, yb, "{:?}", head);
                a.update(&hop(ya, &f, -10.0), -10.0);
                b.update(&hop(yb, &f, -10.0), -10.0);
            }
            assert_eq!(a.estimate(&request(&ns, &f)), b.estimate(&request(&ns, &f)));
        }
    }

    #[test]
    fn test_wrong_feature_length_is_skipped() {
        let short = vec![1.0; FEATURES - 1];
        let mut p = policy(DqnHead::Joint, 1, 1, Exploration::greedy());
        assert_eq!(
            p.update(&hop(n(3), &short, -10.0), -10.0),
            UpdateOutcome::Skipped(SkipReason::FeatureMismatch)
        );
        assert_eq!(p.replay_len(), 0);

        let ns = [n(1), n(3)];
        assert!(ns.contains(&p.decide(&request(&ns, &short))));
    }

    #[test]
    fn test_import_rejects_other_head() {
        let json = policy(DqnHead::OneOut, 1, 1, Exploration::greedy())
            .export_state()
            .unwrap();
        let mut joint = policy(DqnHead::Joint, 1, 1, Exploration::greedy());
        assert!(matches!(joint.import_state(&json), Err(RouteError::State(_))));
    }
}
