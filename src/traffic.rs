//! Traffic generation.
//!
//! Turns the ordered `pkg_distr.sequence` into a lazy stream of timed
//! packet injections and link actions. The stream is finite, yields items
//! in non-decreasing time order and cannot be restarted.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{RouteError, RouteResult};
use crate::time::VirtualTime;
use crate::topology::{Graph, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    Break,
    Restore,
}

impl std::str::FromStr for LinkAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "break_link" => Ok(LinkAction::Break),
            "restore_link" => Ok(LinkAction::Restore),
            other => Err(format!("unknown link action '{}'", other)),
        }
    }
}

/// One validated `sequence` entry.
#[derive(Debug, Clone, PartialEq)]
pub enum TrafficEntry {
    /// `pkg_number` packets spread evenly over `delta` time units.
    Packets {
        pkg_number: usize,
        delta: f64,
        sources: Option<Vec<NodeId>>,
        dests: Option<Vec<NodeId>>,
    },
    /// Break or restore `u-v`, then wait `pause`.
    Link {
        action: LinkAction,
        u: NodeId,
        v: NodeId,
        pause: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrafficItem {
    Packet {
        at: VirtualTime,
        source: NodeId,
        destination: NodeId,
        episode: usize,
    },
    Link {
        at: VirtualTime,
        action: LinkAction,
        u: NodeId,
        v: NodeId,
    },
}

impl TrafficItem {
    pub fn at(&self) -> VirtualTime {
        match self {
            TrafficItem::Packet { at, .. } | TrafficItem::Link { at, .. } => *at,
        }
    }
}

/// Endpoint pools of a packets segment.
#[derive(Debug, Clone)]
struct Endpoints {
    /// Sources that have at least one admissible destination.
    sources: Vec<NodeId>,
    dests: Vec<NodeId>,
}

#[derive(Debug, Clone)]
struct Segment {
    entry: TrafficEntry,
    endpoints: Option<Endpoints>,
    episode: usize,
}

/// Lazy iterator over [`TrafficItem`]s.
#[derive(Debug, Clone)]
pub struct TrafficScheduler {
    segments: Vec<Segment>,
    rng: ChaCha8Rng,
    segment: usize,
    emitted: usize,
    start: f64,
    episodes: usize,
}

impl TrafficScheduler {
    /// Validate `entries` against `graph` and prepare the stream.
    pub fn new(entries: Vec<TrafficEntry>, graph: &Graph, seed: u64) -> RouteResult<Self> {
        let all: Vec<NodeId> = graph.nodes().collect();
        let mut segments = Vec::with_capacity(entries.len());
        let mut episodes = 0;

        for (i, entry) in entries.into_iter().enumerate() {
            let endpoints = match &entry {
                TrafficEntry::Packets {
                    pkg_number,
                    delta,
                    sources,
                    dests,
                } => {
                    if !(delta.is_finite() && *delta > 0.0) {
                        return Err(RouteError::config(format!(
                            "traffic entry {}: delta must be > 0",
                            i
                        )));
                    }
                    let endpoints = endpoints(
                        sources.clone().unwrap_or_else(|| all.clone()),
                        dests.clone().unwrap_or_else(|| all.clone()),
                        graph.node_count(),
                    );
                    if *pkg_number > 0 && endpoints.sources.is_empty() {
                        return Err(RouteError::config(format!(
                            "traffic entry {}: no distinct source/destination pair",
                            i
                        )));
                    }
                    Some(endpoints)
                }
                TrafficEntry::Link { u, v, pause, .. } => {
                    if !(pause.is_finite() && *pause >= 0.0) {
                        return Err(RouteError::config(format!(
                            "traffic entry {}: pause must be >= 0",
                            i
                        )));
                    }
                    if !graph.has_edge(*u, *v) {
                        return Err(RouteError::config(format!(
                            "traffic entry {}: {}-{} is not a link",
                            i, u, v
                        )));
                    }
                    None
                }
            };
            let episode = episodes;
            if endpoints.is_some() {
                episodes += 1;
            }
            segments.push(Segment {
                entry,
                endpoints,
                episode,
            });
        }

        Ok(TrafficScheduler {
            segments,
            rng: ChaCha8Rng::seed_from_u64(seed),
            segment: 0,
            emitted: 0,
            start: 0.0,
            episodes,
        })
    }

    /// Number of packet segments (episodes) in the sequence.
    pub fn episodes(&self) -> usize {
        self.episodes
    }

    /// Total packets the stream will produce.
    pub fn total_packets(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match s.entry {
                TrafficEntry::Packets { pkg_number, .. } => pkg_number,
                TrafficEntry::Link { .. } => 0,
            })
            .sum()
    }

    fn advance(&mut self, by: f64) {
        self.start += by;
        self.segment += 1;
        self.emitted = 0;
    }
}

fn endpoints(mut sources: Vec<NodeId>, mut dests: Vec<NodeId>, n: usize) -> Endpoints {
    sources.retain(|s| s.index() < n);
    dests.retain(|d| d.index() < n);
    sources.sort_unstable();
    sources.dedup();
    dests.sort_unstable();
    dests.dedup();
    sources.retain(|s| dests.iter().any(|d| d != s));
    Endpoints { sources, dests }
}

impl Iterator for TrafficScheduler {
    type Item = TrafficItem;

    fn next(&mut self) -> Option<TrafficItem> {
        loop {
            let seg = self.segments.get(self.segment)?;
            match seg.entry {
                TrafficEntry::Link {
                    action, u, v, pause, ..
                } => {
                    let item = TrafficItem::Link {
                        at: VirtualTime::new(self.start),
                        action,
                        u,
                        v,
                    };
                    self.advance(pause);
                    return Some(item);
                }
                TrafficEntry::Packets {
                    pkg_number, delta, ..
                } => {
                    if self.emitted >= pkg_number {
                        self.advance(delta);
                        continue;
                    }
                    let Some(ends) = seg.endpoints.as_ref() else {
                        self.advance(delta);
                        continue;
                    };
                    let episode = seg.episode;
                    let at = self.start + self.emitted as f64 * delta / pkg_number as f64;
                    let source = ends.sources[self.rng.gen_range(0..ends.sources.len())];
                    let admissible: Vec<NodeId> =
                        ends.dests.iter().copied().filter(|&d| d != source).collect();
                    let destination = admissible[self.rng.gen_range(0..admissible.len())];
                    self.emitted += 1;
                    return Some(TrafficItem::Packet {
                        at: VirtualTime::new(at),
                        source,
                        destination,
                        episode,
                    });
                }
            }
        }
    }
}
