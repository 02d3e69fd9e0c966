//! Routing policies.
//!
//! Every router node owns one [`RoutingPolicy`]. The environment asks it
//! for a next hop when a packet finishes processing and feeds back the
//! observed hop delay once the packet reaches the chosen neighbor.
//!
//! Values are costs: the expected time until delivery. The greedy choice
//! is the neighbor with the smallest value, and a reward is the negated
//! hop delay, so every learner moves its estimate toward
//! `-reward + next_estimate`.

pub mod dqn;
pub mod link_state;
pub mod pred_q;
pub mod replay;
pub mod simple_q;

use std::rc::Rc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::RouterSettings;
use crate::error::{RouteError, RouteResult};
use crate::router::packet::PacketId;
use crate::time::VirtualTime;
use crate::topology::{Graph, NodeId};

pub use dqn::{DqnHead, DqnPolicy};
pub use link_state::LinkStatePolicy;
pub use pred_q::PredictiveQ;
pub use simple_q::SimpleQ;

// ── Contract ──────────────────────────────────────────────────────────

/// Everything a policy may look at when choosing a next hop.
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    pub packet: PacketId,
    pub node: NodeId,
    pub destination: NodeId,
    /// Live neighbors of `node`, sorted, never empty.
    pub neighbors: &'a [NodeId],
    /// Present only when the environment runs a feature encoder.
    pub features: Option<&'a [f64]>,
    pub now: VirtualTime,
}

/// One hop, reported when the packet reaches `action`.
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    pub packet: PacketId,
    pub node: NodeId,
    pub destination: NodeId,
    /// The neighbor that was chosen.
    pub action: NodeId,
    /// Queueing, processing and link latency of the hop.
    pub hop_delay: f64,
    /// The neighbor's own cost-to-destination, `0` if it is the destination.
    pub next_estimate: f64,
    pub terminal: bool,
    /// Features of the decision this hop came from.
    pub features: Option<&'a [f64]>,
    pub now: VirtualTime,
}

impl Transition<'_> {
    /// The bootstrapped cost of the hop: `-reward + next_estimate`.
    pub fn target(&self, reward: f64) -> f64 {
        if self.terminal {
            -reward
        } else {
            -reward + self.next_estimate
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// A non-finite value showed up in the target, a weight or a gradient.
    NumericInstability,
    /// The feature vector is missing or does not fit the network input.
    FeatureMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOutcome {
    /// Parameters changed.
    Applied,
    /// The experience was stored but no training step ran yet.
    Buffered,
    /// The policy does not learn from feedback.
    Ignored,
    Skipped(SkipReason),
}

/// Shared policy contract.
pub trait RoutingPolicy {
    fn kind(&self) -> PolicyKind;

    /// Pick a member of `req.neighbors`.
    fn decide(&mut self, req: &DecisionRequest) -> NodeId;

    /// Learn from one hop. Never panics; non-finite updates are skipped.
    fn update(&mut self, transition: &Transition, reward: f64) -> UpdateOutcome;

    /// Current best cost from `req.node` to `req.destination`.
    fn estimate(&mut self, req: &DecisionRequest) -> f64;

    /// A link went down (`alive == false`) or came back.
    fn on_link_change(&mut self, _u: NodeId, _v: NodeId, _alive: bool) {}

    /// Serialize learned state to JSON.
    fn export_state(&self) -> RouteResult<String>;

    /// Replace learned state from JSON produced by `export_state`.
    fn import_state(&mut self, state: &str) -> RouteResult<()>;
}

// ── Policy kinds ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    #[serde(rename = "simple_q")]
    SimpleQ,
    #[serde(rename = "pred_q")]
    PredictiveQ,
    #[serde(rename = "dqn")]
    Dqn,
    #[serde(rename = "dqn_oneout")]
    DqnOneOut,
    #[serde(rename = "dqn_emb")]
    DqnEmbedding,
    #[serde(rename = "link_state")]
    LinkState,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 6] = [
        PolicyKind::SimpleQ,
        PolicyKind::PredictiveQ,
        PolicyKind::Dqn,
        PolicyKind::DqnOneOut,
        PolicyKind::DqnEmbedding,
        PolicyKind::LinkState,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PolicyKind::SimpleQ => "simple_q",
            PolicyKind::PredictiveQ => "pred_q",
            PolicyKind::Dqn => "dqn",
            PolicyKind::DqnOneOut => "dqn_oneout",
            PolicyKind::DqnEmbedding => "dqn_emb",
            PolicyKind::LinkState => "link_state",
        }
    }

    /// Whether decisions need a feature vector.
    pub fn uses_features(self) -> bool {
        matches!(
            self,
            PolicyKind::Dqn | PolicyKind::DqnOneOut | PolicyKind::DqnEmbedding
        )
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown router kind '{}'", s))
    }
}

// ── Exploration ───────────────────────────────────────────────────────

/// Epsilon-greedy schedule decaying exponentially with the number of
/// decisions taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Exploration {
    pub max_epsilon: f64,
    pub min_epsilon: f64,
    pub decay: f64,
}

impl Exploration {
    pub const fn greedy() -> Self {
        Exploration {
            max_epsilon: 0.0,
            min_epsilon: 0.0,
            decay: 0.0,
        }
    }

    pub const fn decaying() -> Self {
        Exploration {
            max_epsilon: 1.0,
            min_epsilon: 0.01,
            decay: 0.001,
        }
    }

    /// Every decision is uniformly random.
    pub const fn uniform() -> Self {
        Exploration {
            max_epsilon: 1.0,
            min_epsilon: 1.0,
            decay: 0.0,
        }
    }

    pub fn epsilon(&self, step: u64) -> f64 {
        self.min_epsilon
            + (self.max_epsilon - self.min_epsilon) * (-self.decay * step as f64).exp()
    }
}

/// Epsilon-greedy choice over a non-empty neighbor set.
pub(crate) fn explore_or(
    rng: &mut ChaCha8Rng,
    epsilon: f64,
    neighbors: &[NodeId],
    greedy: impl FnOnce() -> NodeId,
) -> NodeId {
    if epsilon > 0.0 && rng.gen::<f64>() < epsilon {
        neighbors[rng.gen_range(0..neighbors.len())]
    } else {
        greedy()
    }
}

/// Neighbor with the smallest value; the lowest id wins ties.
pub(crate) fn argmin(neighbors: &[NodeId], mut value: impl FnMut(NodeId) -> f64) -> NodeId {
    let mut best = neighbors[0];
    let mut best_value = value(best);
    for &y in &neighbors[1..] {
        let v = value(y);
        if v.total_cmp(&best_value).is_lt() {
            best = y;
            best_value = v;
        }
    }
    best
}

pub(crate) fn parse_state<'de, T: Deserialize<'de>>(
    kind: PolicyKind,
    json: &'de str,
) -> RouteResult<T> {
    serde_json::from_str(json)
        .map_err(|e| RouteError::State(format!("cannot import {} state: {}", kind, e)))
}

// ── Construction ──────────────────────────────────────────────────────

/// Static inputs shared by every node's policy.
#[derive(Debug, Clone)]
pub struct PolicyContext {
    pub graph: Rc<Graph>,
    /// Length of the feature vectors the environment will supply.
    pub feature_len: usize,
}

/// Instantiate the policy of `node` from validated settings.
pub fn new_policy(
    kind: PolicyKind,
    settings: &RouterSettings,
    ctx: &PolicyContext,
    node: NodeId,
    rng: ChaCha8Rng,
) -> RouteResult<Box<dyn RoutingPolicy>> {
    let missing = || RouteError::config(format!("settings.router.{} is not configured", kind));
    let n = ctx.graph.node_count();
    let policy: Box<dyn RoutingPolicy> = match kind {
        PolicyKind::SimpleQ => {
            let s = settings.simple_q.as_ref().ok_or_else(missing)?;
            Box::new(SimpleQ::new(s.learning_rate, s.exploration, rng))
        }
        PolicyKind::PredictiveQ => {
            let s = settings.pred_q.as_ref().ok_or_else(missing)?;
            Box::new(PredictiveQ::new(s, rng))
        }
        PolicyKind::Dqn => {
            let s = settings.dqn.as_ref().ok_or_else(missing)?;
            Box::new(DqnPolicy::new(kind, DqnHead::Joint, s, ctx.feature_len, n, rng))
        }
        PolicyKind::DqnOneOut => {
            let s = settings.dqn_oneout.as_ref().ok_or_else(missing)?;
            Box::new(DqnPolicy::new(kind, DqnHead::OneOut, s, ctx.feature_len, n, rng))
        }
        PolicyKind::DqnEmbedding => {
            let s = settings.dqn_emb.as_ref().ok_or_else(missing)?;
            Box::new(DqnPolicy::new(
                kind,
                DqnHead::Joint,
                &s.dqn,
                ctx.feature_len,
                n,
                rng,
            ))
        }
        PolicyKind::LinkState => Box::new(LinkStatePolicy::new(node, Rc::clone(&ctx.graph))),
    };
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn ids(raw: &[u64]) -> Vec<NodeId> {
        raw.iter().copied().map(NodeId::new).collect()
    }

    #[test]
    fn test_epsilon_schedule() {
        let e = Exploration::decaying();
        assert_eq!(e.epsilon(0), 1.0);
        assert!(e.epsilon(1_000) < 0.5);
        assert!((e.epsilon(100_000) - 0.01).abs() < 1e-6);
        assert_eq!(Exploration::greedy().epsilon(0), 0.0);
        assert_eq!(Exploration::uniform().epsilon(10), 1.0);
    }

    #[test]
    fn test_argmin_tie_breaks_on_lowest_id() {
        let ns = ids(&[2, 5, 7]);
        assert_eq!(argmin(&ns, |_| 1.0), NodeId::new(2));
        assert_eq!(argmin(&ns, |y| -(y.raw() as f64)), NodeId::new(7));
    }

    #[test]
    fn test_explore_stays_in_neighbors() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let ns = ids(&[3, 4]);
        for _ in 0..100 {
            let y = explore_or(&mut rng, 1.0, &ns, || NodeId::new(99));
            assert!(ns.contains(&y));
        }
        assert_eq!(explore_or(&mut rng, 0.0, &ns, || NodeId::new(4)), NodeId::new(4));
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in PolicyKind::ALL {
            assert_eq!(kind.name().parse::<PolicyKind>(), Ok(kind));
        }
        assert!("ospf".parse::<PolicyKind>().is_err());
        assert_eq!(
            serde_json::to_string(&PolicyKind::DqnEmbedding).unwrap(),
            "\"dqn_emb\""
        );
    }

    #[test]
    fn test_terminal_target_ignores_estimate() {
        let t = Transition {
            packet: PacketId::new(0),
            node: NodeId::new(0),
            destination: NodeId::new(1),
            action: NodeId::new(1),
            hop_delay: 3.0,
            next_estimate: 50.0,
            terminal: true,
            features: None,
            now: VirtualTime::new(3.0),
        };
        assert_eq!(t.target(-3.0), 3.0);
        let t = Transition {
            terminal: false,
            ..t
        };
        assert_eq!(t.target(-3.0), 53.0);
    }
}
