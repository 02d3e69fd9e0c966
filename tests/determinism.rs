//! Whole-run reproducibility through the public API.

use std::fs;

use qroute::policy::DecisionRequest;
use qroute::{Config, NodeId, PacketId, PolicyKind, RouterBuilder, RunSummary, VirtualTime};

const CONFIG: &str = r#"
network:
  generator: {type: barabasi-albert, n: 12, m: 2, seed: 42, min-latency: 10, max-latency: 15}
settings:
  pkg_distr:
    sequence:
      - {pkg_number: 300, delta: 300}
      - {action: break_link, u: 0, v: 1, pause: 5}
      - {pkg_number: 200, delta: 200}
      - {action: restore_link, u: 0, v: 1}
      - {pkg_number: 100, delta: 100}
  router_env: {pkg_process_delay: 5, max_hops: 50}
  router:
    simple_q:
      learning_rate: 0.5
      exploration: {max_epsilon: 0.5, min_epsilon: 0.05, decay: 0.01}
    pred_q: {learning_rate: 0.7, beta: 0.7, gamma: 0.9}
    dqn:
      optimizer: adam
      activation: relu
      layers: [16]
      batch_size: 8
      mem_capacity: 64
    dqn_oneout: {activation: tanh}
    dqn_emb:
      embedding: {alg: laplacian, dim: 4}
"#;

fn load() -> Config {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    fs::write(&path, CONFIG).unwrap();
    Config::load(&path).unwrap()
}

fn run(kind: PolicyKind, seed: u64) -> RunSummary {
    RouterBuilder::new(load())
        .policy(kind)
        .seed(seed)
        .run()
        .unwrap()
        .0
}

#[test]
fn identical_runs_for_every_router() {
    for kind in PolicyKind::ALL {
        let a = run(kind, 42);
        let b = run(kind, 42);
        assert_eq!(a, b, "{} diverged", kind);
        assert_eq!(a.injected, 600);
        assert_eq!(a.delivered + a.dropped, 600);
        assert_eq!(a.episodes.len(), 3);
    }
}

#[test]
fn seed_changes_the_run() {
    let a = run(PolicyKind::SimpleQ, 1);
    let b = run(PolicyKind::SimpleQ, 2);
    assert_ne!(a.fingerprint, b.fingerprint);
}

#[test]
fn summary_survives_json() {
    let summary = run(PolicyKind::PredictiveQ, 9);
    let json = serde_json::to_string(&summary).unwrap();
    let back: RunSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(back.fingerprint, summary.fingerprint);
    assert_eq!(back.policy, PolicyKind::PredictiveQ);
    assert_eq!(back.episodes.len(), summary.episodes.len());
    assert_eq!(back.updates, summary.updates);
}

#[test]
fn saved_policies_resume_identically() {
    let (_, trained) = RouterBuilder::new(load())
        .policy(PolicyKind::PredictiveQ)
        .run()
        .unwrap();
    let states = trained.export_policies().unwrap();

    let resume = || {
        let (mut sim, mut env) = RouterBuilder::new(load())
            .policy(PolicyKind::PredictiveQ)
            .build()
            .unwrap();
        for (node, state) in &states {
            env.import_policy(*node, state).unwrap();
        }
        env.run(&mut sim)
    };
    assert_eq!(resume(), resume());
}

#[test]
fn imported_policies_decide_like_the_originals() {
    let (_, mut trained) = RouterBuilder::new(load())
        .policy(PolicyKind::SimpleQ)
        .run()
        .unwrap();
    let (_, mut restored) = RouterBuilder::new(load())
        .policy(PolicyKind::SimpleQ)
        .build()
        .unwrap();
    for (node, state) in trained.export_policies().unwrap() {
        restored.import_policy(node, &state).unwrap();
    }

    let destination = NodeId::new(11);
    let nodes: Vec<NodeId> = trained.graph().nodes().collect();
    for node in nodes {
        let neighbors = trained.graph().neighbors(node).to_vec();
        let request = DecisionRequest {
            packet: PacketId::new(0),
            node,
            destination,
            neighbors: &neighbors,
            features: None,
            now: VirtualTime::new(5_000.0),
        };
        for _ in 0..10 {
            let a = trained.router_mut(node).unwrap().policy_mut().decide(&request);
            let b = restored.router_mut(node).unwrap().policy_mut().decide(&request);
            assert_eq!(a, b, "{} diverged after import", node);
        }
    }
}
