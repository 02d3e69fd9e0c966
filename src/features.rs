//! Per-decision feature vectors for the neural policies.

use ndarray::Array2;

use crate::embedding::Embedding;
use crate::topology::{Graph, NodeId};

/// Extra inputs appended after the node/destination part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTag {
    /// The flattened `n × n` adjacency matrix.
    AdjacencyMatrix,
}

impl std::str::FromStr for InputTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amatrix" => Ok(InputTag::AdjacencyMatrix),
            other => Err(format!("unknown additional input tag '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
enum NodeEncoding {
    OneHot,
    Embedded(Embedding),
}

/// Builds `encode(node) ++ encode(destination) ++ additional inputs`.
///
/// The adjacency input reflects the links currently up: the environment
/// reports every break and restore through [`set_link`](Self::set_link).
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    nodes: usize,
    encoding: NodeEncoding,
    inputs: Vec<InputTag>,
    links: Array2<f64>,
    live: Array2<f64>,
}

impl FeatureEncoder {
    /// Nodes are one-hot encoded.
    pub fn one_hot(graph: &Graph, inputs: &[InputTag]) -> Self {
        Self::with_encoding(graph, NodeEncoding::OneHot, inputs)
    }

    /// Nodes are replaced by their embedding vectors.
    pub fn embedded(graph: &Graph, embedding: Embedding, inputs: &[InputTag]) -> Self {
        Self::with_encoding(graph, NodeEncoding::Embedded(embedding), inputs)
    }

    fn with_encoding(graph: &Graph, encoding: NodeEncoding, inputs: &[InputTag]) -> Self {
        let links = graph.adjacency_matrix();
        FeatureEncoder {
            nodes: graph.node_count(),
            encoding,
            inputs: inputs.to_vec(),
            live: links.clone(),
            links,
        }
    }

    fn node_width(&self) -> usize {
        match &self.encoding {
            NodeEncoding::OneHot => self.nodes,
            NodeEncoding::Embedded(e) => e.dim(),
        }
    }

    fn extra_len(&self) -> usize {
        self.inputs
            .iter()
            .map(|tag| match tag {
                InputTag::AdjacencyMatrix => self.nodes * self.nodes,
            })
            .sum()
    }

    /// Length of every vector [`encode`](Self::encode) returns.
    pub fn len(&self) -> usize {
        2 * self.node_width() + self.extra_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Mark `u-v` as down (`alive == false`) or back up. Pairs that are
    /// not edges of the graph stay 0.
    pub fn set_link(&mut self, u: NodeId, v: NodeId, alive: bool) {
        let (i, j) = (u.index(), v.index());
        if i >= self.nodes || j >= self.nodes {
            return;
        }
        let value = if alive { self.links[[i, j]] } else { 0.0 };
        self.live[[i, j]] = value;
        self.live[[j, i]] = value;
    }

    pub fn encode(&self, node: NodeId, destination: NodeId) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.len());
        for n in [node, destination] {
            match &self.encoding {
                NodeEncoding::OneHot => {
                    let start = out.len();
                    out.resize(start + self.nodes, 0.0);
                    out[start + n.index()] = 1.0;
                }
                NodeEncoding::Embedded(e) => out.extend_from_slice(e.get(n)),
            }
        }
        for tag in &self.inputs {
            match tag {
                InputTag::AdjacencyMatrix => out.extend(self.live.iter().copied()),
            }
        }
        out
    }
}
