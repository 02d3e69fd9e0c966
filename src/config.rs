//! Run configuration: YAML schema, validation and variant flattening.
//!
//! The YAML document is first deserialized into permissive `Raw*` structs
//! (integers stay signed so negative values reach validation instead of
//! failing inside the parser), then validated into the typed [`Config`].
//! `dqn_oneout` and `dqn_emb` inherit every field they omit from `dqn`;
//! that merge is resolved here, so runtime code only ever sees a flat
//! [`DqnSettings`].

use std::path::Path;

use serde::Deserialize;

use crate::embedding::{EmbeddingAlg, EmbeddingConfig};
use crate::error::{RouteError, RouteResult};
use crate::features::InputTag;
use crate::nn::{Activation, OptimizerKind};
use crate::policy::{Exploration, PolicyKind};
use crate::topology::{GeneratorConfig, GeneratorKind, NodeId};
use crate::traffic::{LinkAction, TrafficEntry};

/// Default hop limit when `settings.router_env.max_hops` is absent.
pub const DEFAULT_MAX_HOPS: u32 = 100;

/// Default packet size when `settings.router_env.pkg_size` is absent.
pub const DEFAULT_PKG_SIZE: f64 = 1.0;

/// Default DQN optimizer step size.
pub const DEFAULT_DQN_LEARNING_RATE: f64 = 0.001;

// ── Raw schema ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct RawConfig {
    network: RawNetwork,
    settings: RawSettings,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNetwork {
    generator: RawGenerator,
}

#[derive(Debug, Clone, Deserialize)]
struct RawGenerator {
    #[serde(rename = "type")]
    kind: String,
    n: i64,
    m: i64,
    seed: u64,
    #[serde(rename = "min-latency")]
    min_latency: f64,
    #[serde(rename = "max-latency")]
    max_latency: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSettings {
    pkg_distr: RawPkgDistr,
    router_env: RawRouterEnv,
    #[serde(default)]
    router: RawRouter,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPkgDistr {
    sequence: Vec<RawSequenceEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawSequenceEntry {
    Link {
        action: String,
        u: i64,
        v: i64,
        #[serde(default)]
        pause: f64,
    },
    Packets {
        pkg_number: i64,
        delta: f64,
        #[serde(default)]
        sources: Option<Vec<i64>>,
        #[serde(default)]
        dests: Option<Vec<i64>>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RawRouterEnv {
    pkg_process_delay: f64,
    #[serde(default)]
    max_hops: Option<i64>,
    #[serde(default)]
    full_log: bool,
    #[serde(default)]
    bandwidth: Option<f64>,
    #[serde(default)]
    pkg_size: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawRouter {
    simple_q: Option<RawSimpleQ>,
    pred_q: Option<RawPredQ>,
    dqn: Option<RawDqn>,
    dqn_oneout: Option<RawDqn>,
    dqn_emb: Option<RawDqn>,
    link_state: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSimpleQ {
    learning_rate: f64,
    #[serde(default)]
    exploration: Option<RawExploration>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPredQ {
    learning_rate: f64,
    beta: f64,
    gamma: f64,
    #[serde(default)]
    exploration: Option<RawExploration>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct RawExploration {
    max_epsilon: Option<f64>,
    min_epsilon: Option<f64>,
    decay: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawInput {
    tag: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawEmbedding {
    alg: String,
    dim: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawDqn {
    optimizer: Option<String>,
    activation: Option<String>,
    layers: Option<Vec<i64>>,
    additional_inputs: Option<Vec<RawInput>>,
    batch_size: Option<i64>,
    mem_capacity: Option<i64>,
    learning_rate: Option<f64>,
    exploration: Option<RawExploration>,
    embedding: Option<RawEmbedding>,
}

impl RawDqn {
    /// Field-wise override: values present in `self` win over `base`.
    fn merged_over(&self, base: &RawDqn) -> RawDqn {
        self.merged_with_inputs(base, base.additional_inputs.clone())
    }

    /// Like [`merged_over`](Self::merged_over), but an omitted
    /// `additional_inputs` falls back to `inputs` instead of the base's.
    fn merged_with_inputs(&self, base: &RawDqn, inputs: Option<Vec<RawInput>>) -> RawDqn {
        RawDqn {
            optimizer: self.optimizer.clone().or_else(|| base.optimizer.clone()),
            activation: self.activation.clone().or_else(|| base.activation.clone()),
            layers: self.layers.clone().or_else(|| base.layers.clone()),
            additional_inputs: self.additional_inputs.clone().or(inputs),
            batch_size: self.batch_size.or(base.batch_size),
            mem_capacity: self.mem_capacity.or(base.mem_capacity),
            learning_rate: self.learning_rate.or(base.learning_rate),
            exploration: self.exploration.or(base.exploration),
            embedding: self.embedding.clone().or_else(|| base.embedding.clone()),
        }
    }
}

// ── Validated configuration ───────────────────────────────────────────

/// Fully validated run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub generator: GeneratorConfig,
    pub traffic: Vec<TrafficEntry>,
    pub router_env: RouterEnvConfig,
    pub router: RouterSettings,
}

/// Settings of the simulation core.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterEnvConfig {
    /// Per-node processing cost, independent of link latency.
    pub pkg_process_delay: f64,
    /// Packets reaching this many hops are dropped.
    pub max_hops: u32,
    /// Record a hop-by-hop trace and keep finished packets.
    pub full_log: bool,
    /// Link capacity in size units per time unit; `None` means packets
    /// leave without serialization delay.
    pub bandwidth: Option<f64>,
    pub pkg_size: f64,
}

impl RouterEnvConfig {
    /// Time a packet occupies the outgoing link before it starts to
    /// propagate.
    pub fn transfer_time(&self) -> f64 {
        self.bandwidth.map_or(0.0, |b| self.pkg_size / b)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleQSettings {
    pub learning_rate: f64,
    pub exploration: Exploration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredQSettings {
    pub learning_rate: f64,
    /// Step size of the recovery-rate estimate.
    pub beta: f64,
    /// Decay of the recovery rate when estimates grow.
    pub gamma: f64,
    pub exploration: Exploration,
}

/// Flat settings shared by every DQN variant.
#[derive(Debug, Clone, PartialEq)]
pub struct DqnSettings {
    pub optimizer: OptimizerKind,
    pub activation: Activation,
    pub layers: Vec<usize>,
    pub additional_inputs: Vec<InputTag>,
    pub batch_size: usize,
    pub mem_capacity: usize,
    pub learning_rate: f64,
    pub exploration: Exploration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DqnEmbSettings {
    pub dqn: DqnSettings,
    pub embedding: EmbeddingConfig,
}

/// Per-variant settings; a variant is runnable only if present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouterSettings {
    pub simple_q: Option<SimpleQSettings>,
    pub pred_q: Option<PredQSettings>,
    pub dqn: Option<DqnSettings>,
    pub dqn_oneout: Option<DqnSettings>,
    pub dqn_emb: Option<DqnEmbSettings>,
}

impl RouterSettings {
    /// Returns `true` if `kind` can be instantiated from these settings.
    pub fn supports(&self, kind: PolicyKind) -> bool {
        match kind {
            PolicyKind::SimpleQ => self.simple_q.is_some(),
            PolicyKind::PredictiveQ => self.pred_q.is_some(),
            PolicyKind::Dqn => self.dqn.is_some(),
            PolicyKind::DqnOneOut => self.dqn_oneout.is_some(),
            PolicyKind::DqnEmbedding => self.dqn_emb.is_some(),
            PolicyKind::LinkState => true,
        }
    }
}

impl Config {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> RouteResult<Self> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        Self::from_raw(raw)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> RouteResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    fn from_raw(raw: RawConfig) -> RouteResult<Self> {
        let generator = validate_generator(&raw.network.generator)?;
        let traffic = raw
            .settings
            .pkg_distr
            .sequence
            .iter()
            .enumerate()
            .map(|(i, entry)| validate_sequence_entry(i, entry, generator.n))
            .collect::<RouteResult<Vec<_>>>()?;
        let router_env = validate_router_env(&raw.settings.router_env)?;
        let router = validate_router(&raw.settings.router)?;

        Ok(Config {
            generator,
            traffic,
            router_env,
            router,
        })
    }
}

// ── Validation ────────────────────────────────────────────────────────

fn validate_generator(raw: &RawGenerator) -> RouteResult<GeneratorConfig> {
    let kind: GeneratorKind = raw.kind.parse().map_err(RouteError::Config)?;
    if raw.n < 1 {
        return Err(RouteError::config(format!(
            "network.generator.n must be > 0, got {}",
            raw.n
        )));
    }
    if raw.m < 0 {
        return Err(RouteError::config(format!(
            "network.generator.m must be >= 0, got {}",
            raw.m
        )));
    }
    if !(raw.min_latency.is_finite() && raw.min_latency > 0.0) {
        return Err(RouteError::config(format!(
            "network.generator.min-latency must be a positive number, got {}",
            raw.min_latency
        )));
    }
    if !(raw.max_latency.is_finite() && raw.max_latency >= raw.min_latency) {
        return Err(RouteError::config(format!(
            "network.generator.max-latency must be >= min-latency ({}), got {}",
            raw.min_latency, raw.max_latency
        )));
    }
    Ok(GeneratorConfig {
        kind,
        n: raw.n as usize,
        m: raw.m as usize,
        seed: raw.seed,
        min_latency: raw.min_latency,
        max_latency: raw.max_latency,
    })
}

fn node_in_range(field: &str, id: i64, n: usize) -> RouteResult<NodeId> {
    if id < 0 || id as usize >= n {
        return Err(RouteError::config(format!(
            "{} refers to node {} outside 0..{}",
            field, id, n
        )));
    }
    Ok(NodeId::new(id as u64))
}

fn node_list(field: &str, ids: &Option<Vec<i64>>, n: usize) -> RouteResult<Option<Vec<NodeId>>> {
    ids.as_ref()
        .map(|ids| {
            if ids.is_empty() {
                return Err(RouteError::config(format!("{} must not be empty", field)));
            }
            ids.iter().map(|&id| node_in_range(field, id, n)).collect()
        })
        .transpose()
}

fn validate_sequence_entry(
    index: usize,
    raw: &RawSequenceEntry,
    n: usize,
) -> RouteResult<TrafficEntry> {
    let at = format!("settings.pkg_distr.sequence[{}]", index);
    match raw {
        RawSequenceEntry::Packets {
            pkg_number,
            delta,
            sources,
            dests,
        } => {
            if *pkg_number < 0 {
                return Err(RouteError::config(format!(
                    "{}.pkg_number must be >= 0, got {}",
                    at, pkg_number
                )));
            }
            if !(delta.is_finite() && *delta > 0.0) {
                return Err(RouteError::config(format!(
                    "{}.delta must be > 0, got {}",
                    at, delta
                )));
            }
            Ok(TrafficEntry::Packets {
                pkg_number: *pkg_number as usize,
                delta: *delta,
                sources: node_list(&format!("{}.sources", at), sources, n)?,
                dests: node_list(&format!("{}.dests", at), dests, n)?,
            })
        }
        RawSequenceEntry::Link {
            action,
            u,
            v,
            pause,
        } => {
            let action: LinkAction = action.parse().map_err(RouteError::Config)?;
            if !(pause.is_finite() && *pause >= 0.0) {
                return Err(RouteError::config(format!(
                    "{}.pause must be >= 0, got {}",
                    at, pause
                )));
            }
            Ok(TrafficEntry::Link {
                action,
                u: node_in_range(&format!("{}.u", at), *u, n)?,
                v: node_in_range(&format!("{}.v", at), *v, n)?,
                pause: *pause,
            })
        }
    }
}

fn validate_router_env(raw: &RawRouterEnv) -> RouteResult<RouterEnvConfig> {
    if !(raw.pkg_process_delay.is_finite() && raw.pkg_process_delay >= 0.0) {
        return Err(RouteError::config(format!(
            "settings.router_env.pkg_process_delay must be >= 0, got {}",
            raw.pkg_process_delay
        )));
    }
    let max_hops = match raw.max_hops {
        None => DEFAULT_MAX_HOPS,
        Some(h) if h > 0 && h <= u32::MAX as i64 => h as u32,
        Some(h) => {
            return Err(RouteError::config(format!(
                "settings.router_env.max_hops must be > 0, got {}",
                h
            )))
        }
    };
    if let Some(b) = raw.bandwidth {
        if !(b.is_finite() && b > 0.0) {
            return Err(RouteError::config(format!(
                "settings.router_env.bandwidth must be > 0, got {}",
                b
            )));
        }
    }
    let pkg_size = raw.pkg_size.unwrap_or(DEFAULT_PKG_SIZE);
    if !(pkg_size.is_finite() && pkg_size > 0.0) {
        return Err(RouteError::config(format!(
            "settings.router_env.pkg_size must be > 0, got {}",
            pkg_size
        )));
    }
    Ok(RouterEnvConfig {
        pkg_process_delay: raw.pkg_process_delay,
        max_hops,
        full_log: raw.full_log,
        bandwidth: raw.bandwidth,
        pkg_size,
    })
}

fn unit_interval(field: &str, value: f64, allow_zero: bool) -> RouteResult<f64> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !(lower_ok && value <= 1.0) {
        let range = if allow_zero { "[0, 1]" } else { "(0, 1]" };
        return Err(RouteError::config(format!(
            "{} must be in {}, got {}",
            field, range, value
        )));
    }
    Ok(value)
}

fn validate_exploration(
    field: &str,
    raw: Option<RawExploration>,
    default: Exploration,
) -> RouteResult<Exploration> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let max_epsilon = unit_interval(
        &format!("{}.max_epsilon", field),
        raw.max_epsilon.unwrap_or(default.max_epsilon),
        true,
    )?;
    let min_epsilon = unit_interval(
        &format!("{}.min_epsilon", field),
        raw.min_epsilon.unwrap_or(default.min_epsilon.min(max_epsilon)),
        true,
    )?;
    if min_epsilon > max_epsilon {
        return Err(RouteError::config(format!(
            "{}.min_epsilon ({}) exceeds max_epsilon ({})",
            field, min_epsilon, max_epsilon
        )));
    }
    let decay = raw.decay.unwrap_or(default.decay);
    if !(decay.is_finite() && decay >= 0.0) {
        return Err(RouteError::config(format!(
            "{}.decay must be >= 0, got {}",
            field, decay
        )));
    }
    Ok(Exploration {
        max_epsilon,
        min_epsilon,
        decay,
    })
}

fn positive(field: &str, value: Option<i64>) -> RouteResult<usize> {
    match value {
        None => Err(RouteError::config(format!("{} is required", field))),
        Some(v) if v > 0 => Ok(v as usize),
        Some(v) => Err(RouteError::config(format!("{} must be > 0, got {}", field, v))),
    }
}

fn validate_dqn(section: &str, raw: &RawDqn) -> RouteResult<DqnSettings> {
    let required = |name: &str, v: &Option<String>| -> RouteResult<String> {
        v.clone()
            .ok_or_else(|| RouteError::config(format!("{}.{} is required", section, name)))
    };
    let optimizer: OptimizerKind = required("optimizer", &raw.optimizer)?
        .parse()
        .map_err(RouteError::Config)?;
    let activation: Activation = required("activation", &raw.activation)?
        .parse()
        .map_err(RouteError::Config)?;

    let layers = raw
        .layers
        .as_ref()
        .ok_or_else(|| RouteError::config(format!("{}.layers is required", section)))?
        .iter()
        .map(|&l| positive(&format!("{}.layers[]", section), Some(l)))
        .collect::<RouteResult<Vec<_>>>()?;

    let additional_inputs = raw
        .additional_inputs
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|input| input.tag.parse::<InputTag>().map_err(RouteError::Config))
        .collect::<RouteResult<Vec<_>>>()?;

    let learning_rate = raw.learning_rate.unwrap_or(DEFAULT_DQN_LEARNING_RATE);
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        return Err(RouteError::config(format!(
            "{}.learning_rate must be > 0, got {}",
            section, learning_rate
        )));
    }

    Ok(DqnSettings {
        optimizer,
        activation,
        layers,
        additional_inputs,
        batch_size: positive(&format!("{}.batch_size", section), raw.batch_size)?,
        mem_capacity: positive(&format!("{}.mem_capacity", section), raw.mem_capacity)?,
        learning_rate,
        exploration: validate_exploration(
            &format!("{}.exploration", section),
            raw.exploration,
            Exploration::decaying(),
        )?,
    })
}

fn validate_embedding(section: &str, raw: &Option<RawEmbedding>) -> RouteResult<EmbeddingConfig> {
    let raw = raw
        .as_ref()
        .ok_or_else(|| RouteError::config(format!("{}.embedding is required", section)))?;
    let alg: EmbeddingAlg = raw.alg.parse().map_err(RouteError::Config)?;
    let dim = positive(&format!("{}.embedding.dim", section), Some(raw.dim))?;
    Ok(EmbeddingConfig { alg, dim })
}

fn validate_router(raw: &RawRouter) -> RouteResult<RouterSettings> {
    let simple_q = raw
        .simple_q
        .as_ref()
        .map(|s| -> RouteResult<_> {
            Ok(SimpleQSettings {
                learning_rate: unit_interval(
                    "settings.router.simple_q.learning_rate",
                    s.learning_rate,
                    false,
                )?,
                exploration: validate_exploration(
                    "settings.router.simple_q.exploration",
                    s.exploration,
                    Exploration::greedy(),
                )?,
            })
        })
        .transpose()?;

    let pred_q = raw
        .pred_q
        .as_ref()
        .map(|s| -> RouteResult<_> {
            Ok(PredQSettings {
                learning_rate: unit_interval(
                    "settings.router.pred_q.learning_rate",
                    s.learning_rate,
                    false,
                )?,
                beta: unit_interval("settings.router.pred_q.beta", s.beta, true)?,
                gamma: unit_interval("settings.router.pred_q.gamma", s.gamma, true)?,
                exploration: validate_exploration(
                    "settings.router.pred_q.exploration",
                    s.exploration,
                    Exploration::greedy(),
                )?,
            })
        })
        .transpose()?;

    let base = raw.dqn.clone().unwrap_or_default();
    let dqn = raw
        .dqn
        .as_ref()
        .map(|d| validate_dqn("settings.router.dqn", d))
        .transpose()?;
    let dqn_oneout = raw
        .dqn_oneout
        .as_ref()
        .map(|d| validate_dqn("settings.router.dqn_oneout", &d.merged_over(&base)))
        .transpose()?;
    let dqn_emb = raw
        .dqn_emb
        .as_ref()
        .map(|d| -> RouteResult<_> {
            // Embeddings stand in for the adjacency input, so it is not
            // inherited.
            let merged = d.merged_with_inputs(&base, None);
            Ok(DqnEmbSettings {
                dqn: validate_dqn("settings.router.dqn_emb", &merged)?,
                embedding: validate_embedding("settings.router.dqn_emb", &merged.embedding)?,
            })
        })
        .transpose()?;

    if let Some(extra) = &raw.link_state {
        if !(extra.is_null() || extra.as_mapping().map_or(false, |m| m.is_empty())) {
            tracing::warn!("settings.router.link_state takes no parameters; ignoring them");
        }
    }

    Ok(RouterSettings {
        simple_q,
        pred_q,
        dqn,
        dqn_oneout,
        dqn_emb,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
network:
  generator:
    type: barabasi-albert
    n: 10
    m: 2
    seed: 42
    min-latency: 10
    max-latency: 15
settings:
  pkg_distr:
    sequence:
      - {pkg_number: 2000, delta: 20}
      - {action: break_link, u: 0, v: 1, pause: 5}
      - {pkg_number: 100, delta: 10, sources: [0, 1], dests: [8, 9]}
  router_env:
    pkg_process_delay: 5
  router:
    simple_q:
      learning_rate: 0.5
    pred_q:
      learning_rate: 0.7
      beta: 0.7
      gamma: 0.9
    dqn:
      optimizer: rmsprop
      activation: relu
      layers: [64, 64]
      additional_inputs:
        - tag: amatrix
      batch_size: 1
      mem_capacity: 1
    dqn_oneout:
      batch_size: 32
    dqn_emb:
      additional_inputs: []
      embedding:
        alg: lap
        dim: 8
"#;

    fn with(from: &str, to: &str) -> String {
        assert!(SAMPLE.contains(from), "fixture lacks {:?}", from);
        SAMPLE.replacen(from, to, 1)
    }

    fn config_err(yaml: &str) -> String {
        match Config::from_yaml_str(yaml) {
            Err(RouteError::Config(msg)) => msg,
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_sample_parses() {
        let cfg = Config::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(cfg.generator.n, 10);
        assert_eq!(cfg.generator.m, 2);
        assert_eq!(cfg.generator.seed, 42);
        assert_eq!(cfg.traffic.len(), 3);
        assert_eq!(cfg.router_env.pkg_process_delay, 5.0);
        assert_eq!(cfg.router_env.max_hops, DEFAULT_MAX_HOPS);
        assert!(!cfg.router_env.full_log);
        assert!(cfg.router.supports(PolicyKind::SimpleQ));
        assert!(cfg.router.supports(PolicyKind::LinkState));
    }

    #[test]
    fn test_dqn_oneout_inherits_dqn() {
        let cfg = Config::from_yaml_str(SAMPLE).unwrap();
        let dqn = cfg.router.dqn.unwrap();
        let oneout = cfg.router.dqn_oneout.unwrap();
        assert_eq!(oneout.batch_size, 32);
        assert_eq!(oneout.mem_capacity, dqn.mem_capacity);
        assert_eq!(oneout.layers, vec![64, 64]);
        assert_eq!(oneout.optimizer, OptimizerKind::RmsProp);
        assert_eq!(oneout.additional_inputs, vec![InputTag::AdjacencyMatrix]);
    }

    #[test]
    fn test_dqn_emb_overrides_inputs() {
        let cfg = Config::from_yaml_str(SAMPLE).unwrap();
        let emb = cfg.router.dqn_emb.unwrap();
        assert!(emb.dqn.additional_inputs.is_empty());
        assert_eq!(emb.embedding.dim, 8);
        assert_eq!(emb.embedding.alg, EmbeddingAlg::Laplacian);
        assert_eq!(emb.dqn.batch_size, 1);
    }

    #[test]
    fn test_dqn_emb_does_not_inherit_additional_inputs() {
        let yaml = with("      additional_inputs: []\n      embedding:", "      embedding:");
        let emb = Config::from_yaml_str(&yaml).unwrap().router.dqn_emb.unwrap();
        assert!(emb.dqn.additional_inputs.is_empty());
        assert_eq!(emb.dqn.layers, vec![64, 64]);

        let yaml = with(
            "      additional_inputs: []\n      embedding:",
            "      additional_inputs: [{tag: amatrix}]\n      embedding:",
        );
        let emb = Config::from_yaml_str(&yaml).unwrap().router.dqn_emb.unwrap();
        assert_eq!(emb.dqn.additional_inputs, vec![InputTag::AdjacencyMatrix]);
    }

    #[test]
    fn test_bandwidth_sets_transfer_time() {
        let cfg = Config::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(cfg.router_env.bandwidth, None);
        assert_eq!(cfg.router_env.transfer_time(), 0.0);

        let yaml = with(
            "pkg_process_delay: 5",
            "pkg_process_delay: 5\n    bandwidth: 4\n    pkg_size: 2",
        );
        let cfg = Config::from_yaml_str(&yaml).unwrap();
        assert_eq!(cfg.router_env.transfer_time(), 0.5);

        let msg = config_err(&with(
            "pkg_process_delay: 5",
            "pkg_process_delay: 5\n    bandwidth: 0",
        ));
        assert!(msg.contains("bandwidth"));
    }

    #[test]
    fn test_rejects_non_positive_n() {
        let msg = config_err(&with("n: 10", "n: 0"));
        assert!(msg.contains("n must be > 0"));
    }

    #[test]
    fn test_rejects_inverted_latency_range() {
        let msg = config_err(&with("max-latency: 15", "max-latency: 5"));
        assert!(msg.contains("max-latency"));
    }

    #[test]
    fn test_rejects_negative_pkg_number() {
        let msg = config_err(&with("pkg_number: 2000", "pkg_number: -1"));
        assert!(msg.contains("pkg_number"));
    }

    #[test]
    fn test_rejects_zero_delta() {
        let msg = config_err(&with("delta: 20", "delta: 0"));
        assert!(msg.contains("delta"));
    }

    #[test]
    fn test_rejects_learning_rate_out_of_range() {
        let msg = config_err(&with("learning_rate: 0.5", "learning_rate: 1.5"));
        assert!(msg.contains("simple_q.learning_rate"));
    }

    #[test]
    fn test_rejects_beta_out_of_range() {
        let msg = config_err(&with("beta: 0.7", "beta: -0.1"));
        assert!(msg.contains("beta"));
    }

    #[test]
    fn test_rejects_negative_process_delay() {
        let msg = config_err(&with("pkg_process_delay: 5", "pkg_process_delay: -5"));
        assert!(msg.contains("pkg_process_delay"));
    }

    #[test]
    fn test_rejects_unknown_optimizer() {
        let msg = config_err(&with("optimizer: rmsprop", "optimizer: lbfgs"));
        assert!(msg.contains("lbfgs"));
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let msg = config_err(&with("batch_size: 1", "batch_size: 0"));
        assert!(msg.contains("batch_size"));
    }

    #[test]
    fn test_rejects_out_of_range_source() {
        let msg = config_err(&with("sources: [0, 1]", "sources: [0, 10]"));
        assert!(msg.contains("sources"));
    }

    #[test]
    fn test_rejects_unknown_generator() {
        let msg = config_err(&with("type: barabasi-albert", "type: erdos-renyi"));
        assert!(msg.contains("erdos-renyi"));
    }

    #[test]
    fn test_missing_embedding_is_error() {
        let yaml = with("      embedding:\n        alg: lap\n        dim: 8\n", "");
        let msg = config_err(&yaml);
        assert!(msg.contains("embedding is required"));
    }

    #[test]
    fn test_max_hops_and_exploration_parse() {
        let yaml = with(
            "pkg_process_delay: 5",
            "pkg_process_delay: 5\n    max_hops: 7\n    full_log: true",
        );
        let yaml = yaml.replacen(
            "learning_rate: 0.5",
            "learning_rate: 0.5\n      exploration: {max_epsilon: 1.0, min_epsilon: 1.0, decay: 0}",
            1,
        );
        let cfg = Config::from_yaml_str(&yaml).unwrap();
        assert_eq!(cfg.router_env.max_hops, 7);
        assert!(cfg.router_env.full_log);
        let exp = cfg.router.simple_q.unwrap().exploration;
        assert_eq!(exp.epsilon(1_000), 1.0);
    }

    #[test]
    fn test_malformed_yaml_is_yaml_error() {
        let err = Config::from_yaml_str("network: [").unwrap_err();
        assert!(matches!(err, RouteError::Yaml(_)));
    }
}
