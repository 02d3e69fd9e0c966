//! Spectral node embeddings.
//!
//! Computed once per run from the static topology. Vectors are the
//! eigenvectors of the symmetric normalized Laplacian, smallest eigenvalues
//! first, trivial eigenvector excluded.

use ndarray::Array2;

use crate::topology::{Graph, NodeId};

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingAlg {
    /// Laplacian eigenmaps.
    Laplacian,
}

impl std::str::FromStr for EmbeddingAlg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "laplacian" | "lap" => Ok(EmbeddingAlg::Laplacian),
            other => Err(format!("unknown embedding algorithm '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingConfig {
    pub alg: EmbeddingAlg,
    pub dim: usize,
}

/// Fixed-dimension vector per node.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    vectors: Vec<Vec<f64>>,
    dim: usize,
    padded: usize,
}

impl Embedding {
    pub fn compute(graph: &Graph, cfg: &EmbeddingConfig) -> Embedding {
        match cfg.alg {
            EmbeddingAlg::Laplacian => laplacian_eigenmap(graph, cfg.dim),
        }
    }

    /// The vector of `node`, always `dim()` long.
    pub fn get(&self, node: NodeId) -> &[f64] {
        &self.vectors[node.index()]
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Trailing dimensions filled with zeros because the graph has fewer
    /// informative eigenvectors than requested.
    pub fn padded(&self) -> usize {
        self.padded
    }
}

fn normalized_laplacian(graph: &Graph) -> Array2<f64> {
    let n = graph.node_count();
    let adj = graph.adjacency_matrix();
    let inv_sqrt_deg: Vec<f64> = adj
        .rows()
        .into_iter()
        .map(|row| {
            let d = row.sum();
            if d > 0.0 {
                1.0 / d.sqrt()
            } else {
                0.0
            }
        })
        .collect();

    let mut lap = Array2::zeros((n, n));
    for i in 0..n {
        if inv_sqrt_deg[i] > 0.0 {
            lap[[i, i]] = 1.0;
        }
        for j in 0..n {
            if adj[[i, j]] != 0.0 {
                lap[[i, j]] -= adj[[i, j]] * inv_sqrt_deg[i] * inv_sqrt_deg[j];
            }
        }
    }
    lap
}

/// Cyclic Jacobi eigen-decomposition of a symmetric matrix.
///
/// Returns the eigenvalues and a matrix whose columns are the matching
/// unit eigenvectors.
pub(crate) fn symmetric_eigen(mut a: Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut v: Array2<f64> = Array2::eye(n);

    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off < JACOBI_TOLERANCE {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[[k, p]], a[[k, q]]);
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[[p, k]], a[[q, k]]);
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    (a.diag().to_vec(), v)
}

fn laplacian_eigenmap(graph: &Graph, dim: usize) -> Embedding {
    let n = graph.node_count();
    let (values, vectors) = symmetric_eigen(normalized_laplacian(graph));

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));

    // The first eigenvector is proportional to sqrt(degree) and carries
    // no positional information.
    let informative: Vec<usize> = order.into_iter().skip(1).take(dim).collect();
    let padded = dim - informative.len();
    if padded > 0 {
        tracing::warn!(
            requested = dim,
            available = informative.len(),
            padded,
            "embedding dimension exceeds graph rank; zero-padding"
        );
    }

    let mut table = vec![vec![0.0; dim]; n];
    for (j, &col) in informative.iter().enumerate() {
        let column = vectors.column(col);
        let mut pivot = 0;
        for i in 1..n {
            if column[i].abs() > column[pivot].abs() {
                pivot = i;
            }
        }
        let sign = if column[pivot] < 0.0 { -1.0 } else { 1.0 };
        for (i, row) in table.iter_mut().enumerate() {
            row[j] = sign * column[i];
        }
    }

    Embedding {
        vectors: table,
        dim,
        padded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{generate, GeneratorConfig, GeneratorKind};

    fn ba10() -> Graph {
        generate(&GeneratorConfig {
            kind: GeneratorKind::BarabasiAlbert,
            n: 10,
            m: 2,
            seed: 42,
            min_latency: 10.0,
            max_latency: 15.0,
        })
        .unwrap()
    }

    fn lap(dim: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            alg: EmbeddingAlg::Laplacian,
            dim,
        }
    }

    #[test]
    fn test_jacobi_on_path_graph() {
        // Normalized Laplacian of a 3-node path has spectrum {0, 1, 2}.
        let n = NodeId::new;
        let g = Graph::from_edges(3, [(n(0), n(1), 1.0), (n(1), n(2), 1.0)]).unwrap();
        let (mut values, _) = symmetric_eigen(normalized_laplacian(&g));
        values.sort_by(f64::total_cmp);
        for (got, want) in values.iter().zip([0.0, 1.0, 2.0]) {
            assert!((got - want).abs() < 1e-9, "{} vs {}", got, want);
        }
    }

    #[test]
    fn test_eigenvectors_reconstruct_matrix() {
        let l = normalized_laplacian(&ba10());
        let (values, v) = symmetric_eigen(l.clone());
        let diag = Array2::from_diag(&ndarray::Array1::from(values));
        let rebuilt = v.dot(&diag).dot(&v.t());
        for (a, b) in rebuilt.iter().zip(l.iter()) {
            assert!((a - b).abs() < 1e-8);
        }
    }

    #[test]
    fn test_vectors_have_requested_dim() {
        let emb = Embedding::compute(&ba10(), &lap(4));
        assert_eq!(emb.dim(), 4);
        assert_eq!(emb.padded(), 0);
        for node in 0..10 {
            assert_eq!(emb.get(NodeId::new(node)).len(), 4);
        }
        // Each embedding axis is a unit eigenvector.
        for j in 0..4 {
            let norm: f64 = (0..10).map(|i| emb.get(NodeId::new(i))[j].powi(2)).sum();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dim_above_rank_is_zero_padded() {
        let emb = Embedding::compute(&ba10(), &lap(16));
        assert_eq!(emb.padded(), 7);
        for node in 0..10 {
            let v = emb.get(NodeId::new(node));
            assert_eq!(v.len(), 16);
            assert!(v[9..].iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn test_deterministic_and_sign_normalized() {
        let a = Embedding::compute(&ba10(), &lap(5));
        let b = Embedding::compute(&ba10(), &lap(5));
        assert_eq!(a, b);
        for j in 0..5 {
            let column: Vec<f64> = (0..10).map(|i| a.get(NodeId::new(i))[j]).collect();
            let pivot = column
                .iter()
                .copied()
                .fold(0.0f64, |acc, x| if x.abs() > acc.abs() { x } else { acc });
            assert!(pivot > 0.0);
        }
    }

    #[test]
    fn test_alg_names() {
        assert_eq!("lap".parse::<EmbeddingAlg>(), Ok(EmbeddingAlg::Laplacian));
        assert!("node2vec".parse::<EmbeddingAlg>().is_err());
    }
}
