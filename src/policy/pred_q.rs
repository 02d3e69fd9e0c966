//! Predictive Q-routing.
//!
//! Alongside `Q` every cell keeps the best value ever observed `B`, a
//! recovery rate `R` and the time of its last update `U`. When a link
//! improves after congestion, `R` captures how fast the estimate was
//! dropping, and decisions use the predicted value
//! `max(Q + (now - U) * R, B)` so that a recovering path is retried
//! before fresh feedback confirms it.

use std::collections::BTreeMap;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::simple_q::initial_value;
use super::{
    argmin, explore_or, parse_state, DecisionRequest, Exploration, PolicyKind, RoutingPolicy,
    SkipReason, Transition, UpdateOutcome,
};
use crate::config::PredQSettings;
use crate::error::RouteResult;
use crate::time::VirtualTime;
use crate::topology::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredCell {
    pub q: f64,
    pub best: f64,
    pub recovery: f64,
    pub updated_at: VirtualTime,
}

impl PredCell {
    fn initial(destination: NodeId, neighbor: NodeId) -> Self {
        let v = initial_value(destination, neighbor);
        PredCell {
            q: v,
            best: v,
            recovery: 0.0,
            updated_at: VirtualTime::ZERO,
        }
    }

    /// Predicted cost at `now`.
    pub fn predicted(&self, now: VirtualTime) -> f64 {
        let elapsed = now.duration_since(self.updated_at).unwrap_or(0.0);
        (self.q + elapsed * self.recovery).max(self.best)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PredEntry {
    destination: NodeId,
    neighbor: NodeId,
    cell: PredCell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PredQState {
    decisions: u64,
    rng: ChaCha8Rng,
    table: Vec<PredEntry>,
}

#[derive(Debug, Clone)]
pub struct PredictiveQ {
    table: BTreeMap<(NodeId, NodeId), PredCell>,
    learning_rate: f64,
    beta: f64,
    gamma: f64,
    exploration: Exploration,
    decisions: u64,
    rng: ChaCha8Rng,
}

impl PredictiveQ {
    pub fn new(settings: &PredQSettings, rng: ChaCha8Rng) -> Self {
        PredictiveQ {
            table: BTreeMap::new(),
            learning_rate: settings.learning_rate,
            beta: settings.beta,
            gamma: settings.gamma,
            exploration: settings.exploration,
            decisions: 0,
            rng,
        }
    }

    pub fn cell(&self, destination: NodeId, neighbor: NodeId) -> PredCell {
        self.table
            .get(&(destination, neighbor))
            .copied()
            .unwrap_or_else(|| PredCell::initial(destination, neighbor))
    }
}

impl RoutingPolicy for PredictiveQ {
    fn kind(&self) -> PolicyKind {
        PolicyKind::PredictiveQ
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
                    .unwrap_or_else(|| PredCell::initial(req.destination, y))
                    .predicted(req.now)
            })
        })
    }

    fn update(&mut self, t: &Transition, reward: f64) -> UpdateOutcome {
        let mut cell = self.cell(t.destination, t.action);
        let delta = t.target(reward) - cell.q;

        cell.q += self.learning_rate * delta;
        cell.best = cell.best.min(cell.q);
        if delta < 0.0 {
            if let Some(elapsed) = t.now.duration_since(cell.updated_at).filter(|&e| e > 0.0) {
                cell.recovery += self.beta * (delta / elapsed);
            }
        } else if delta > 0.0 {
            cell.recovery *= self.gamma;
        }
        cell.updated_at = cell.updated_at.max(t.now);

        if !(cell.q.is_finite() && cell.best.is_finite() && cell.recovery.is_finite()) {
            tracing::warn!(node = %t.node, packet = %t.packet, "non-finite PQ update skipped");
            return UpdateOutcome::Skipped(SkipReason::NumericInstability);
        }
        self.table.insert((t.destination, t.action), cell);
        UpdateOutcome::Applied
    }

    fn estimate(&mut self, req: &DecisionRequest) -> f64 {
        req.neighbors
            .iter()
            .map(|&y| self.cell(req.destination, y).q)
            .fold(f64::INFINITY, f64::min)
    }

    fn export_state(&self) -> RouteResult<String> {
        let state = PredQState {
            decisions: self.decisions,
            rng: self.rng.clone(),
            table: self
                .table
                .iter()
                .map(|(&(destination, neighbor), &cell)| PredEntry {
                    destination,
                    neighbor,
                    cell,
                })
                .collect(),
        };
        Ok(serde_json::to_string(&state)?)
    }

    fn import_state(&mut self, state: &str) -> RouteResult<()> {
        let state: PredQState = parse_state(self.kind(), state)?;
        self.decisions = state.decisions;
        self.rng = state.rng;
        self.table = state
            .table
            .into_iter()
            .map(|e| ((e.destination, e.neighbor), e.cell))
            .collect();
        Ok(())
    }
}
