//! Bounded experience replay.

use std::collections::VecDeque;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// One stored hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub features: Vec<f64>,
    /// Index of the chosen neighbor.
    pub action: usize,
    pub reward: f64,
    /// Bootstrap value reported by the neighbor at feedback time.
    pub next_estimate: f64,
    pub terminal: bool,
}

impl Experience {
    pub fn target(&self) -> f64 {
        if self.terminal {
            -self.reward
        } else {
            -self.reward + self.next_estimate
        }
    }
}

/// FIFO buffer that evicts the oldest experience once full.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayBuffer {
    capacity: usize,
    items: VecDeque<Experience>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        ReplayBuffer {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, e: Experience) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(e);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Up to `k` distinct experiences, drawn without replacement.
    pub fn sample<R: Rng>(&self, rng: &mut R, k: usize) -> Vec<&Experience> {
        let k = k.min(self.items.len());
        rand::seq::index::sample(rng, self.items.len(), k)
            .into_iter()
            .map(|i| &self.items[i])
            .collect()
    }
}
