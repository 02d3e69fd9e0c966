//! Network topology: node identifiers, the latency-weighted graph and the
//! seeded Barabasi-Albert generator.

use std::collections::BTreeMap;

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{RouteError, RouteResult};

// ── Node ID ───────────────────────────────────────────────────────────

/// A router node. Nodes of an `n`-node graph are numbered `0..n`.
///
/// A newtype rather than a bare integer so node indices cannot be mixed
/// up with packet or event ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    #[inline]
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Position of this node in per-node vectors.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Canonical key of an undirected edge.
#[inline]
pub fn edge_key(u: NodeId, v: NodeId) -> (NodeId, NodeId) {
    if u <= v {
        (u, v)
    } else {
        (v, u)
    }
}

// ── Graph ─────────────────────────────────────────────────────────────

/// Undirected, connected graph with a latency on every edge.
///
/// Adjacency lists are kept sorted by node id so that iteration order,
/// and with it every seeded decision made over a neighbor set, is stable.
#[derive(Debug, Clone, PartialEq)]
pub struct Graph {
    edges: BTreeMap<(NodeId, NodeId), f64>,
    adjacency: Vec<Vec<NodeId>>,
}

impl Graph {
    /// Build a graph from an explicit edge list.
    ///
    /// Rejects self-loops, duplicate edges, out-of-range endpoints,
    /// non-positive latencies and disconnected results.
    pub fn from_edges(
        n: usize,
        edges: impl IntoIterator<Item = (NodeId, NodeId, f64)>,
    ) -> RouteResult<Self> {
        if n < 1 {
            return Err(RouteError::Topology("graph needs at least one node".into()));
        }
        let mut graph = Graph {
            edges: BTreeMap::new(),
            adjacency: vec![Vec::new(); n],
        };
        for (u, v, latency) in edges {
            if u.index() >= n || v.index() >= n {
                return Err(RouteError::Topology(format!(
                    "edge {}-{} outside 0..{}",
                    u, v, n
                )));
            }
            if u == v {
                return Err(RouteError::Topology(format!("self-loop at {}", u)));
            }
            if !(latency.is_finite() && latency > 0.0) {
                return Err(RouteError::Topology(format!(
                    "edge {}-{} has invalid latency {}",
                    u, v, latency
                )));
            }
            if graph.has_edge(u, v) {
                return Err(RouteError::Topology(format!("duplicate edge {}-{}", u, v)));
            }
            graph.insert(u, v, latency);
        }
        if !graph.is_connected() {
            return Err(RouteError::Topology("graph is not connected".into()));
        }
        Ok(graph)
    }

    fn insert(&mut self, u: NodeId, v: NodeId, latency: f64) {
        self.edges.insert(edge_key(u, v), latency);
        for (a, b) in [(u, v), (v, u)] {
            let list = &mut self.adjacency[a.index()];
            let pos = list.partition_point(|&x| x < b);
            list.insert(pos, b);
        }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.adjacency.len() as u64).map(NodeId::new)
    }

    /// Sorted neighbors of `node`; empty for unknown nodes.
    pub fn neighbors(&self, node: NodeId) -> &[NodeId] {
        self.adjacency
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.neighbors(node).len()
    }

    pub fn has_edge(&self, u: NodeId, v: NodeId) -> bool {
        self.edges.contains_key(&edge_key(u, v))
    }

    /// Latency of edge `u-v`, if it exists.
    pub fn latency(&self, u: NodeId, v: NodeId) -> Option<f64> {
        self.edges.get(&edge_key(u, v)).copied()
    }

    /// Edges in key order as `((min, max), latency)`.
    pub fn edges(&self) -> impl Iterator<Item = ((NodeId, NodeId), f64)> + '_ {
        self.edges.iter().map(|(&k, &l)| (k, l))
    }

    /// 0/1 adjacency matrix, row-major by node id.
    pub fn adjacency_matrix(&self) -> Array2<f64> {
        let n = self.node_count();
        let mut m = Array2::zeros((n, n));
        for &(u, v) in self.edges.keys() {
            m[[u.index(), v.index()]] = 1.0;
            m[[v.index(), u.index()]] = 1.0;
        }
        m
    }

    pub fn is_connected(&self) -> bool {
        let n = self.node_count();
        let mut seen = vec![false; n];
        let mut stack = vec![NodeId::new(0)];
        seen[0] = true;
        let mut count = 1;
        while let Some(u) = stack.pop() {
            for &v in self.neighbors(u) {
                if !seen[v.index()] {
                    seen[v.index()] = true;
                    count += 1;
                    stack.push(v);
                }
            }
        }
        count == n
    }

    /// Lowest-latency path from `src` to `dst` over edges accepted by
    /// `alive`, both endpoints included.
    ///
    /// Ties between equally distant nodes resolve to the lower node id.
    /// Returns `None` if `dst` is unreachable.
    pub fn shortest_path(
        &self,
        src: NodeId,
        dst: NodeId,
        alive: impl Fn(NodeId, NodeId) -> bool,
    ) -> Option<Vec<NodeId>> {
        let n = self.node_count();
        if src.index() >= n || dst.index() >= n {
            return None;
        }
        let mut dist = vec![f64::INFINITY; n];
        let mut prev: Vec<Option<NodeId>> = vec![None; n];
        let mut done = vec![false; n];
        dist[src.index()] = 0.0;

        loop {
            let next = (0..n)
                .filter(|&i| !done[i] && dist[i].is_finite())
                .min_by(|&a, &b| dist[a].total_cmp(&dist[b]).then(a.cmp(&b)));
            let Some(u) = next else { break };
            done[u] = true;
            if u == dst.index() {
                break;
            }
            let un = NodeId::new(u as u64);
            for &v in self.neighbors(un) {
                if done[v.index()] || !alive(un, v) {
                    continue;
                }
                let cand = dist[u] + self.latency(un, v).unwrap_or(f64::INFINITY);
                if cand < dist[v.index()] {
                    dist[v.index()] = cand;
                    prev[v.index()] = Some(un);
                }
            }
        }

        if !done[dst.index()] {
            return None;
        }
        let mut path = vec![dst];
        let mut cur = dst;
        while let Some(p) = prev[cur.index()] {
            path.push(p);
            cur = p;
        }
        path.reverse();
        Some(path)
    }
}

// ── Generator ─────────────────────────────────────────────────────────

/// Supported topology families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorKind {
    BarabasiAlbert,
}

impl std::str::FromStr for GeneratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "barabasi-albert" | "barabasi_albert" | "ba" => Ok(GeneratorKind::BarabasiAlbert),
            other => Err(format!("unknown topology generator type '{}'", other)),
        }
    }
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorKind::BarabasiAlbert => write!(f, "barabasi-albert"),
        }
    }
}

/// Parameters of `network.generator`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub kind: GeneratorKind,
    pub n: usize,
    pub m: usize,
    pub seed: u64,
    pub min_latency: f64,
    pub max_latency: f64,
}

/// Generate a graph. Identical parameters yield an identical graph.
pub fn generate(cfg: &GeneratorConfig) -> RouteResult<Graph> {
    match cfg.kind {
        GeneratorKind::BarabasiAlbert => barabasi_albert(cfg),
    }
}

fn barabasi_albert(cfg: &GeneratorConfig) -> RouteResult<Graph> {
    let (n, m) = (cfg.n, cfg.m);
    if n < 1 {
        return Err(RouteError::config(format!("n must be > 0, got {}", n)));
    }
    if m >= n {
        return Err(RouteError::config(format!(
            "attachment parameter m={} must be smaller than n={}",
            m, n
        )));
    }
    if m < 1 && n > 1 {
        return Err(RouteError::Topology(format!(
            "m=0 cannot connect {} nodes",
            n
        )));
    }
    if !(cfg.min_latency > 0.0 && cfg.max_latency >= cfg.min_latency && cfg.max_latency.is_finite())
    {
        return Err(RouteError::config(format!(
            "invalid latency range [{}, {}]",
            cfg.min_latency, cfg.max_latency
        )));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let mut degree = vec![0usize; n];
    let mut edges: Vec<(NodeId, NodeId, f64)> = Vec::new();
    let mut link = |u: usize, v: usize, rng: &mut ChaCha8Rng, degree: &mut Vec<usize>| {
        let latency = rng.gen_range(cfg.min_latency..=cfg.max_latency);
        degree[u] += 1;
        degree[v] += 1;
        edges.push((NodeId::new(u as u64), NodeId::new(v as u64), latency));
    };

    // Connected core: a path over the first m nodes.
    for i in 1..m {
        link(i - 1, i, &mut rng, &mut degree);
    }

    for new in m..n {
        let mut targets: Vec<usize> = Vec::with_capacity(m);
        for _ in 0..m {
            let candidates = (0..new).filter(|c| !targets.contains(c));
            let total: usize = candidates.clone().map(|c| degree[c]).sum();
            let pick = if total == 0 {
                let pool: Vec<usize> = candidates.collect();
                pool[rng.gen_range(0..pool.len())]
            } else {
                let mut r = rng.gen_range(0..total);
                let mut chosen = None;
                for c in candidates {
                    if r < degree[c] {
                        chosen = Some(c);
                        break;
                    }
                    r -= degree[c];
                }
                // r < total guarantees a hit.
                chosen.unwrap_or(0)
            };
            targets.push(pick);
        }
        targets.sort_unstable();
        for t in targets {
            link(t, new, &mut rng, &mut degree);
        }
    }

    let graph = Graph::from_edges(n, edges)?;
    tracing::debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        seed = cfg.seed,
        "generated topology"
    );
    Ok(graph)
}
