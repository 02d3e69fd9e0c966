/// Fluent construction of a ready-to-run routing simulation.
///
/// Hides the wiring between a validated [`Config`], the generated
/// topology, the feature encoder, per-node policies and the traffic
/// stream, while keeping every random source derived from one seed.
use std::rc::Rc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::Config;
use crate::embedding::Embedding;
use crate::error::{RouteError, RouteResult};
use crate::features::FeatureEncoder;
use crate::metrics::{hash_bytes, hash_combine, RunSummary};
use crate::policy::{new_policy, PolicyContext, PolicyKind};
use crate::router::{RouterEnvironment, RouterNode};
use crate::simulation::Simulation;
use crate::topology::{generate, Graph};
use crate::traffic::{TrafficEntry, TrafficScheduler};

const TRAFFIC_STREAM: &[u8] = b"traffic";
const POLICY_STREAM: &[u8] = b"policy";

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Independent seed for sub-stream `(stream, index)` of `base`.
pub fn derive_seed(base: u64, stream: &[u8], index: u64) -> u64 {
    splitmix64(hash_combine(hash_combine(base, hash_bytes(stream)), index))
}

// ── RouterBuilder ─────────────────────────────────────────────────────

/// Builder for a `(Simulation, RouterEnvironment)` pair.
///
/// # Example
/// ```rust,no_run
/// use qroute::builder::RouterBuilder;
/// use qroute::config::Config;
/// use qroute::policy::PolicyKind;
///
/// let config = Config::load("configs/ba10.yaml")?;
/// let (summary, _env) = RouterBuilder::new(config)
///     .policy(PolicyKind::PredictiveQ)
///     .seed(7)
///     .run()?;
/// println!("{}", summary.mean_latency);
/// # Ok::<(), qroute::RouteError>(())
/// ```
pub struct RouterBuilder {
    config: Config,
    policy: Option<PolicyKind>,
    seed: Option<u64>,
    graph: Option<Graph>,
}

impl RouterBuilder {
    pub fn new(config: Config) -> Self {
        RouterBuilder {
            config,
            policy: None,
            seed: None,
            graph: None,
        }
    }

    /// Route with `kind` instead of the first configured variant.
    pub fn policy(mut self, kind: PolicyKind) -> Self {
        self.policy = Some(kind);
        self
    }

    /// Override `network.generator.seed`.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Use a fixed topology instead of generating one.
    pub fn graph(mut self, graph: Graph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Replace the traffic sequence.
    pub fn traffic(mut self, entries: Vec<TrafficEntry>) -> Self {
        self.config.traffic = entries;
        self
    }

    pub fn max_hops(mut self, max_hops: u32) -> Self {
        self.config.router_env.max_hops = max_hops;
        self
    }

    pub fn process_delay(mut self, delay: f64) -> Self {
        self.config.router_env.pkg_process_delay = delay;
        self
    }

    /// Record every routing decision.
    pub fn full_log(mut self) -> Self {
        self.config.router_env.full_log = true;
        self
    }

    /// The variant used when none is chosen explicitly: the first one
    /// configured, in [`PolicyKind::ALL`] order.
    pub fn default_policy(config: &Config) -> PolicyKind {
        PolicyKind::ALL
            .into_iter()
            .find(|&k| k != PolicyKind::LinkState && config.router.supports(k))
            .unwrap_or(PolicyKind::LinkState)
    }

    /// Build and return `(Simulation, RouterEnvironment)` with the first
    /// traffic item already scheduled.
    pub fn build(self) -> RouteResult<(Simulation, RouterEnvironment)> {
        let config = self.config;
        let kind = self
            .policy
            .unwrap_or_else(|| Self::default_policy(&config));
        if !config.router.supports(kind) {
            return Err(RouteError::config(format!(
                "settings.router.{} is not configured",
                kind
            )));
        }

        let mut generator = config.generator.clone();
        if let Some(seed) = self.seed {
            generator.seed = seed;
        }
        let seed = generator.seed;
        let graph = match self.graph {
            Some(graph) => graph,
            None => generate(&generator)?,
        };
        let graph = Rc::new(graph);

        let encoder = match kind {
            PolicyKind::Dqn => config
                .router
                .dqn
                .as_ref()
                .map(|s| FeatureEncoder::one_hot(&graph, &s.additional_inputs)),
            PolicyKind::DqnOneOut => config
                .router
                .dqn_oneout
                .as_ref()
                .map(|s| FeatureEncoder::one_hot(&graph, &s.additional_inputs)),
            PolicyKind::DqnEmbedding => config.router.dqn_emb.as_ref().map(|s| {
                let embedding = Embedding::compute(&graph, &s.embedding);
                FeatureEncoder::embedded(&graph, embedding, &s.dqn.additional_inputs)
            }),
            _ => None,
        };

        let ctx = PolicyContext {
            graph: Rc::clone(&graph),
            feature_len: encoder.as_ref().map_or(0, FeatureEncoder::len),
        };
        let nodes = graph
            .nodes()
            .map(|node| {
                let rng = ChaCha8Rng::seed_from_u64(derive_seed(seed, POLICY_STREAM, node.raw()));
                let policy = new_policy(kind, &config.router, &ctx, node, rng)?;
                Ok(RouterNode::new(node, policy))
            })
            .collect::<RouteResult<Vec<_>>>()?;

        let traffic = TrafficScheduler::new(
            config.traffic,
            &graph,
            derive_seed(seed, TRAFFIC_STREAM, 0),
        )?;

        let mut env = RouterEnvironment::new(
            graph,
            nodes,
            traffic,
            encoder,
            config.router_env,
            kind,
            seed,
        )?;
        let mut sim = Simulation::new();
        env.start(&mut sim);
        Ok((sim, env))
    }

    /// Build, run to completion and return the summary with the final
    /// environment.
    pub fn run(self) -> RouteResult<(RunSummary, RouterEnvironment)> {
        let (mut sim, mut env) = self.build()?;
        let summary = env.run(&mut sim);
        Ok((summary, env))
    }
}
