//! Run metrics: per-packet records, per-episode aggregates and the run
//! fingerprint.
//!
//! Every packet that reaches a terminal state is reported exactly once.
//! The fingerprint folds those reports in order, so two runs of the same
//! configuration produce the same value and any divergence in routing
//! changes it.

use serde::{Deserialize, Serialize};

use crate::error::DropReason;
use crate::policy::{PolicyKind, UpdateOutcome};
use crate::router::packet::{Packet, PacketId, PacketState};
use crate::topology::NodeId;

// ── Hashing ───────────────────────────────────────────────────────────

/// Combine two hashes (order-dependent).
pub fn hash_combine(a: u64, b: u64) -> u64 {
    let mut h = a;
    h = h.wrapping_mul(0x517cc1b727220a95);
    h = h.wrapping_add(b);
    h ^= h >> 32;
    h
}

/// FNV-1a over a byte slice.
pub fn hash_bytes(data: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for &b in data {
        h ^= b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

// ── Records ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Delivered,
    Dropped(DropReason),
}

/// Final report of one packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub packet: PacketId,
    pub source: NodeId,
    pub destination: NodeId,
    pub episode: usize,
    pub created_at: f64,
    pub finished_at: f64,
    /// End-to-end time from injection to delivery or drop.
    pub latency: f64,
    pub hops: u32,
    pub outcome: Outcome,
    /// Only kept when hop tracing is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<NodeId>>,
}

impl PacketRecord {
    /// Build the record of a terminal packet; `None` while still in flight.
    pub fn from_packet(packet: &Packet, keep_path: bool) -> Option<Self> {
        let outcome = match packet.state {
            PacketState::Delivered => Outcome::Delivered,
            PacketState::Dropped(reason) => Outcome::Dropped(reason),
            _ => return None,
        };
        let finished_at = packet.finished_at?;
        Some(PacketRecord {
            packet: packet.id,
            source: packet.source,
            destination: packet.destination,
            episode: packet.episode,
            created_at: packet.created_at.as_f64(),
            finished_at: finished_at.as_f64(),
            latency: packet.latency().unwrap_or(0.0),
            hops: packet.hops,
            outcome,
            path: keep_path.then(|| packet.path.clone()),
        })
    }

    fn hash(&self) -> u64 {
        let outcome = match self.outcome {
            Outcome::Delivered => 0,
            Outcome::Dropped(DropReason::RoutingDeadEnd) => 1,
            Outcome::Dropped(DropReason::HopLimitExceeded) => 2,
        };
        [
            self.packet.raw(),
            self.source.raw(),
            self.destination.raw(),
            self.hops as u64,
            outcome,
            self.finished_at.to_bits(),
        ]
        .into_iter()
        .fold(hash_bytes(b"packet"), hash_combine)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub injected: u64,
    pub delivered: u64,
    pub dropped_dead_end: u64,
    pub dropped_hop_limit: u64,
    /// Mean end-to-end latency of delivered packets.
    pub mean_latency: f64,
    pub max_latency: f64,
    pub mean_hops: f64,
}

#[derive(Debug, Clone, Default)]
struct EpisodeAcc {
    injected: u64,
    delivered: u64,
    dead_end: u64,
    hop_limit: u64,
    latency_sum: f64,
    latency_max: f64,
    hops_sum: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateCounts {
    pub applied: u64,
    pub buffered: u64,
    pub ignored: u64,
    pub skipped: u64,
}

/// Everything known about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub policy: PolicyKind,
    pub nodes: usize,
    pub edges: usize,
    pub seed: u64,
    pub injected: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub mean_latency: f64,
    pub events_processed: u64,
    pub end_time: f64,
    pub updates: UpdateCounts,
    pub episodes: Vec<EpisodeSummary>,
    /// Hex digest of every packet report in order.
    pub fingerprint: String,
}

/// Run-level facts the reporter does not observe itself.
#[derive(Debug, Clone, Copy)]
pub struct RunInfo {
    pub policy: PolicyKind,
    pub nodes: usize,
    pub edges: usize,
    pub seed: u64,
    pub events_processed: u64,
    pub end_time: f64,
}

// ── Reporter ──────────────────────────────────────────────────────────

/// Collects packet reports and update outcomes during a run.
#[derive(Debug, Clone)]
pub struct Reporter {
    records: Vec<PacketRecord>,
    episodes: Vec<EpisodeAcc>,
    updates: UpdateCounts,
    fingerprint: u64,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Reporter {
            records: Vec::new(),
            episodes: Vec::new(),
            updates: UpdateCounts::default(),
            fingerprint: hash_bytes(b"qroute"),
        }
    }

    fn episode_mut(&mut self, episode: usize) -> &mut EpisodeAcc {
        if self.episodes.len() <= episode {
            self.episodes.resize_with(episode + 1, EpisodeAcc::default);
        }
        &mut self.episodes[episode]
    }

    pub fn injected(&mut self, episode: usize) {
        self.episode_mut(episode).injected += 1;
    }

    /// Report a terminal packet.
    pub fn record(&mut self, record: PacketRecord) {
        let acc = self.episode_mut(record.episode);
        match record.outcome {
            Outcome::Delivered => {
                acc.delivered += 1;
                acc.latency_sum += record.latency;
                acc.latency_max = acc.latency_max.max(record.latency);
                acc.hops_sum += record.hops as u64;
            }
            Outcome::Dropped(DropReason::RoutingDeadEnd) => acc.dead_end += 1,
            Outcome::Dropped(DropReason::HopLimitExceeded) => acc.hop_limit += 1,
        }
        self.fingerprint = hash_combine(self.fingerprint, record.hash());
        self.records.push(record);
    }

    pub fn update(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Applied => self.updates.applied += 1,
            UpdateOutcome::Buffered => self.updates.buffered += 1,
            UpdateOutcome::Ignored => self.updates.ignored += 1,
            UpdateOutcome::Skipped(_) => self.updates.skipped += 1,
        }
    }

    pub fn records(&self) -> &[PacketRecord] {
        &self.records
    }

    pub fn updates(&self) -> &UpdateCounts {
        &self.updates
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn episode_summaries(&self) -> Vec<EpisodeSummary> {
        self.episodes
            .iter()
            .enumerate()
            .map(|(episode, acc)| EpisodeSummary {
                episode,
                injected: acc.injected,
                delivered: acc.delivered,
                dropped_dead_end: acc.dead_end,
                dropped_hop_limit: acc.hop_limit,
                mean_latency: mean(acc.latency_sum, acc.delivered),
                max_latency: acc.latency_max,
                mean_hops: mean(acc.hops_sum as f64, acc.delivered),
            })
            .collect()
    }

    pub fn summary(&self, info: RunInfo) -> RunSummary {
        let episodes = self.episode_summaries();
        let delivered: u64 = episodes.iter().map(|e| e.delivered).sum();
        let latency_sum: f64 = self.episodes.iter().map(|e| e.latency_sum).sum();
        RunSummary {
            policy: info.policy,
            nodes: info.nodes,
            edges: info.edges,
            seed: info.seed,
            injected: episodes.iter().map(|e| e.injected).sum(),
            delivered,
            dropped: episodes
                .iter()
                .map(|e| e.dropped_dead_end + e.dropped_hop_limit)
                .sum(),
            mean_latency: mean(latency_sum, delivered),
            events_processed: info.events_processed,
            end_time: info.end_time,
            updates: self.updates.clone(),
            episodes,
            fingerprint: format!("{:016x}", self.fingerprint),
        }
    }
}

fn mean(sum: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64, episode: usize, latency: f64, outcome: Outcome) -> PacketRecord {
        PacketRecord {
            packet: PacketId::new(id),
            source: NodeId::new(0),
            destination: NodeId::new(1),
            episode,
            created_at: 0.0,
            finished_at: latency,
            latency,
            hops: 2,
            outcome,
            path: None,
        }
    }

    fn info() -> RunInfo {
        RunInfo {
            policy: PolicyKind::SimpleQ,
            nodes: 2,
            edges: 1,
            seed: 0,
            events_processed: 10,
            end_time: 30.0,
        }
    }

    #[test]
    fn test_hash_determinism() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
        assert_ne!(hash_combine(1, 2), hash_combine(2, 1));
    }

    #[test]
    fn test_episode_aggregates() {
        let mut r = Reporter::new();
        for _ in 0..3 {
            r.injected(0);
        }
        r.injected(1);
        r.record(record(0, 0, 10.0, Outcome::Delivered));
        r.record(record(1, 0, 20.0, Outcome::Delivered));
        r.record(record(2, 0, 5.0, Outcome::Dropped(DropReason::HopLimitExceeded)));
        r.record(record(3, 1, 4.0, Outcome::Dropped(DropReason::RoutingDeadEnd)));

        let eps = r.episode_summaries();
        assert_eq!(eps.len(), 2);
        assert_eq!(eps[0].injected, 3);
        assert_eq!(eps[0].delivered, 2);
        assert_eq!(eps[0].dropped_hop_limit, 1);
        assert_eq!(eps[0].mean_latency, 15.0);
        assert_eq!(eps[0].max_latency, 20.0);
        assert_eq!(eps[1].dropped_dead_end, 1);
        assert_eq!(eps[1].mean_latency, 0.0);

        let s = r.summary(info());
        assert_eq!(s.injected, 4);
        assert_eq!(s.delivered, 2);
        assert_eq!(s.dropped, 2);
        assert_eq!(s.mean_latency, 15.0);
        assert_eq!(s.fingerprint.len(), 16);
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let mut a = Reporter::new();
        a.record(record(0, 0, 1.0, Outcome::Delivered));
        a.record(record(1, 0, 2.0, Outcome::Delivered));
        let mut b = Reporter::new();
        b.record(record(1, 0, 2.0, Outcome::Delivered));
        b.record(record(0, 0, 1.0, Outcome::Delivered));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_update_counts() {
        let mut r = Reporter::new();
        r.update(UpdateOutcome::Applied);
        r.update(UpdateOutcome::Applied);
        r.update(UpdateOutcome::Buffered);
        r.update(UpdateOutcome::Skipped(crate::policy::SkipReason::NumericInstability));
        assert_eq!(
            r.updates(),
            &UpdateCounts {
                applied: 2,
                buffered: 1,
                ignored: 0,
                skipped: 1
            }
        );
    }

    #[test]
    fn test_summary_serializes() {
        let mut r = Reporter::new();
        r.record(record(0, 0, 1.0, Outcome::Delivered));
        let json = serde_json::to_value(r.summary(info())).unwrap();
        assert_eq!(json["policy"], "simple_q");
        assert_eq!(json["delivered"], 1);
    }
}
