//! [`RouterEnvironment`]: owns the routers and packets and turns events
//! into queueing, routing decisions and feedback.

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::config::RouterEnvConfig;
use crate::error::{DropReason, RouteError, RouteResult};
use crate::event::{Event, EventType};
use crate::features::FeatureEncoder;
use crate::metrics::{PacketRecord, Reporter, RunInfo, RunSummary};
use crate::policy::{DecisionRequest, PolicyKind, Transition};
use crate::simulation::{EventHandler, Simulation, SimulationContext};
use crate::time::VirtualTime;
use crate::topology::{edge_key, Graph, NodeId};
use crate::traffic::{LinkAction, TrafficItem, TrafficScheduler};

use super::node::RouterNode;
use super::packet::{Packet, PacketId};
use super::trace::HopRecord;

/// The simulated network.
///
/// Implements [`EventHandler`] so it can be passed directly to
/// [`Simulation::run`]. Traffic is pulled one item at a time: the next
/// injection or link action is scheduled when the previous one fires, so
/// the event queue never holds more than one pending traffic event.
#[derive(Debug)]
pub struct RouterEnvironment {
    graph: Rc<Graph>,
    nodes: Vec<RouterNode>,
    packets: BTreeMap<PacketId, Packet>,
    down: BTreeSet<(NodeId, NodeId)>,
    /// When each directed link finishes serializing its last packet.
    link_free: BTreeMap<(NodeId, NodeId), VirtualTime>,
    traffic: TrafficScheduler,
    next_packet: u64,
    encoder: Option<FeatureEncoder>,
    settings: RouterEnvConfig,
    policy: PolicyKind,
    seed: u64,
    reporter: Reporter,
    trace: Vec<HopRecord>,
}

impl RouterEnvironment {
    /// `nodes[i]` must be the router of node `i`.
    pub fn new(
        graph: Rc<Graph>,
        nodes: Vec<RouterNode>,
        traffic: TrafficScheduler,
        encoder: Option<FeatureEncoder>,
        settings: RouterEnvConfig,
        policy: PolicyKind,
        seed: u64,
    ) -> RouteResult<Self> {
        if nodes.len() != graph.node_count()
            || nodes.iter().enumerate().any(|(i, r)| r.id().index() != i)
        {
            return Err(RouteError::Topology(format!(
                "expected one router per node 0..{}",
                graph.node_count()
            )));
        }
        Ok(RouterEnvironment {
            graph,
            nodes,
            packets: BTreeMap::new(),
            down: BTreeSet::new(),
            link_free: BTreeMap::new(),
            traffic,
            next_packet: 0,
            encoder,
            settings,
            policy,
            seed,
            reporter: Reporter::new(),
            trace: Vec::new(),
        })
    }

    /// Schedule the first traffic item. Call once before running.
    pub fn start(&mut self, sim: &mut Simulation) {
        if let Some((at, payload)) = self.next_traffic_event() {
            sim.schedule(at, payload);
        }
    }

    /// Run to completion and summarise.
    pub fn run(&mut self, sim: &mut Simulation) -> RunSummary {
        tracing::info!(
            policy = %self.policy,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            packets = self.traffic.total_packets(),
            episodes = self.traffic.episodes(),
            "run started"
        );
        let processed = sim.run(self);
        let summary = self.summary(sim);
        for e in &summary.episodes {
            tracing::info!(
                episode = e.episode,
                injected = e.injected,
                delivered = e.delivered,
                dead_end = e.dropped_dead_end,
                hop_limit = e.dropped_hop_limit,
                mean_latency = e.mean_latency,
                "episode finished"
            );
        }
        tracing::info!(
            events = processed,
            delivered = summary.delivered,
            dropped = summary.dropped,
            mean_latency = summary.mean_latency,
            fingerprint = %summary.fingerprint,
            "run finished"
        );
        summary
    }

    pub fn summary(&self, sim: &Simulation) -> RunSummary {
        self.reporter.summary(RunInfo {
            policy: self.policy,
            nodes: self.graph.node_count(),
            edges: self.graph.edge_count(),
            seed: self.seed,
            events_processed: sim.events_processed(),
            end_time: sim.current_time().as_f64(),
        })
    }

    // ── Inspection ────────────────────────────────────────────────

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn policy_kind(&self) -> PolicyKind {
        self.policy
    }

    pub fn router(&self, node: NodeId) -> Option<&RouterNode> {
        self.nodes.get(node.index())
    }

    pub fn router_mut(&mut self, node: NodeId) -> Option<&mut RouterNode> {
        self.nodes.get_mut(node.index())
    }

    /// A packet still in the network. Finished packets are kept only
    /// when `full_log` is set; their records stay with the reporter.
    pub fn packet(&self, id: PacketId) -> Option<&Packet> {
        self.packets.get(&id)
    }

    pub fn packets(&self) -> impl Iterator<Item = &Packet> {
        self.packets.values()
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn encoder(&self) -> Option<&FeatureEncoder> {
        self.encoder.as_ref()
    }

    /// Hop-by-hop decisions; empty unless `full_log` is set.
    pub fn trace(&self) -> &[HopRecord] {
        &self.trace
    }

    pub fn is_link_up(&self, u: NodeId, v: NodeId) -> bool {
        self.graph.has_edge(u, v) && !self.down.contains(&edge_key(u, v))
    }

    /// Policy state of every node, as `(node, json)`.
    pub fn export_policies(&self) -> RouteResult<Vec<(NodeId, String)>> {
        self.nodes
            .iter()
            .map(|r| Ok((r.id(), r.policy().export_state()?)))
            .collect()
    }

    pub fn import_policy(&mut self, node: NodeId, state: &str) -> RouteResult<()> {
        self.nodes
            .get_mut(node.index())
            .ok_or_else(|| RouteError::State(format!("no router {}", node)))?
            .policy_mut()
            .import_state(state)
    }

    // ── Internals ─────────────────────────────────────────────────

    fn alive_neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.graph
            .neighbors(node)
            .iter()
            .copied()
            .filter(|&y| !self.down.contains(&edge_key(node, y)))
            .collect()
    }

    fn features(&self, node: NodeId, destination: NodeId) -> Option<Vec<f64>> {
        self.encoder.as_ref().map(|e| e.encode(node, destination))
    }

    /// Pull the next traffic item and turn it into an event.
    fn next_traffic_event(&mut self) -> Option<(VirtualTime, EventType)> {
        match self.traffic.next()? {
            TrafficItem::Packet {
                at,
                source,
                destination,
                episode,
            } => {
                let id = PacketId::new(self.next_packet);
                self.next_packet += 1;
                self.packets
                    .insert(id, Packet::new(id, source, destination, at, episode));
                self.reporter.injected(episode);
                Some((at, EventType::PacketArrival { packet: id }))
            }
            TrafficItem::Link { at, action, u, v } => {
                let payload = match action {
                    LinkAction::Break => EventType::LinkBreak { u, v },
                    LinkAction::Restore => EventType::LinkRestore { u, v },
                };
                Some((at, payload))
            }
        }
    }

    fn schedule_next_traffic(&mut self, ctx: &mut SimulationContext) {
        if let Some((at, payload)) = self.next_traffic_event() {
            ctx.schedule_at(at.max(ctx.now()), payload);
        }
    }

    fn enqueue(&mut self, ctx: &mut SimulationContext, node: NodeId, id: PacketId) {
        let now = ctx.now();
        let Some(packet) = self.packets.get_mut(&id) else {
            return;
        };
        packet.enqueue(node, now);
        let done = self.nodes[node.index()].enqueue(id, now, self.settings.pkg_process_delay);
        ctx.schedule_at(done, EventType::ProcessingComplete { node, packet: id });
    }

    fn terminate(&mut self, id: PacketId, now: VirtualTime, reason: Option<DropReason>) {
        let Some(packet) = self.packets.get_mut(&id) else {
            return;
        };
        let changed = match reason {
            None => packet.deliver(now),
            Some(reason) => packet.drop_with(reason, now),
        };
        if !changed {
            return;
        }
        match reason {
            None => tracing::debug!(packet = %id, hops = packet.hops, "delivered"),
            Some(reason) => tracing::warn!(
                packet = %id,
                at = ?packet.location,
                hops = packet.hops,
                %reason,
                "packet dropped"
            ),
        }
        if let Some(record) = PacketRecord::from_packet(packet, self.settings.full_log) {
            self.reporter.record(record);
        }
        if !self.settings.full_log {
            self.packets.remove(&id);
        }
    }

    fn on_processing_complete(
        &mut self,
        ctx: &mut SimulationContext,
        event: &Event,
        node: NodeId,
        id: PacketId,
    ) {
        let now = ctx.now();
        self.nodes[node.index()].dequeue(id);
        let Some(packet) = self.packets.get(&id) else {
            return;
        };
        if packet.is_terminal() {
            return;
        }
        let (destination, hops) = (packet.destination, packet.hops);

        if hops >= self.settings.max_hops {
            self.terminate(id, now, Some(DropReason::HopLimitExceeded));
            return;
        }
        let neighbors = self.alive_neighbors(node);
        if neighbors.is_empty() {
            self.terminate(id, now, Some(DropReason::RoutingDeadEnd));
            return;
        }

        let features = self.features(node, destination);
        let request = DecisionRequest {
            packet: id,
            node,
            destination,
            neighbors: &neighbors,
            features: features.as_deref(),
            now,
        };
        let next = self.nodes[node.index()].policy_mut().decide(&request);
        if !neighbors.contains(&next) {
            tracing::error!(%node, %next, packet = %id, "policy chose a non-neighbor");
            self.terminate(id, now, Some(DropReason::RoutingDeadEnd));
            return;
        }
        let Some(latency) = self.graph.latency(node, next) else {
            tracing::error!(%node, %next, packet = %id, "live neighbor without a link");
            self.terminate(id, now, Some(DropReason::RoutingDeadEnd));
            return;
        };
        tracing::debug!(packet = %id, %node, %next, %destination, "routed");

        if let Some(packet) = self.packets.get_mut(&id) {
            packet.mark_decided();
            packet.depart(node, next);
        }
        if self.settings.full_log {
            self.trace.push(HopRecord {
                time: now,
                event_id: event.id,
                packet: id,
                node,
                next,
                destination,
                queue_len: self.nodes[node.index()].queue_len(),
            });
        }

        // The link sends one packet at a time, then the packet propagates.
        let free = self.link_free.entry((node, next)).or_insert(now);
        let start = (*free).max(now);
        let sent = start.plus(self.settings.transfer_time()).unwrap_or(start);
        *free = sent;
        ctx.schedule_at(
            sent.plus(latency).unwrap_or(sent),
            EventType::LinkArrival {
                from: node,
                to: next,
                packet: id,
            },
        );
    }

    fn on_link_arrival(
        &mut self,
        ctx: &mut SimulationContext,
        from: NodeId,
        to: NodeId,
        id: PacketId,
    ) {
        let now = ctx.now();
        let Some(packet) = self.packets.get(&id) else {
            return;
        };
        if packet.is_terminal() {
            return;
        }
        let destination = packet.destination;
        let hop_delay = now.duration_since(packet.arrival_at).unwrap_or(0.0);
        let terminal = to == destination;

        let next_estimate = if terminal {
            0.0
        } else {
            let mut neighbors = self.alive_neighbors(to);
            if neighbors.is_empty() {
                neighbors = self.graph.neighbors(to).to_vec();
            }
            let features = self.features(to, destination);
            let request = DecisionRequest {
                packet: id,
                node: to,
                destination,
                neighbors: &neighbors,
                features: features.as_deref(),
                now,
            };
            self.nodes[to.index()].policy_mut().estimate(&request)
        };

        let features = self.features(from, destination);
        let transition = Transition {
            packet: id,
            node: from,
            destination,
            action: to,
            hop_delay,
            next_estimate,
            terminal,
            features: features.as_deref(),
            now,
        };
        let outcome = self.nodes[from.index()]
            .policy_mut()
            .update(&transition, -hop_delay);
        self.reporter.update(outcome);

        if terminal {
            self.terminate(id, now, None);
        } else {
            self.enqueue(ctx, to, id);
        }
    }

    fn set_link(&mut self, u: NodeId, v: NodeId, alive: bool) {
        let changed = if alive {
            self.down.remove(&edge_key(u, v))
        } else {
            self.down.insert(edge_key(u, v))
        };
        if changed {
            tracing::info!(%u, %v, alive, "link state changed");
        }
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.set_link(u, v, alive);
        }
        for router in &mut self.nodes {
            router.policy_mut().on_link_change(u, v, alive);
        }
    }
}

impl EventHandler for RouterEnvironment {
    fn handle(&mut self, ctx: &mut SimulationContext, event: &Event) {
        match event.payload {
            EventType::PacketArrival { packet } => {
                self.schedule_next_traffic(ctx);
                if let Some(source) = self.packets.get(&packet).map(|p| p.source) {
                    self.enqueue(ctx, source, packet);
                }
            }
            EventType::ProcessingComplete { node, packet } => {
                self.on_processing_complete(ctx, event, node, packet);
            }
            EventType::LinkArrival { from, to, packet } => {
                self.on_link_arrival(ctx, from, to, packet);
            }
            EventType::LinkBreak { u, v } => {
                self.schedule_next_traffic(ctx);
                self.set_link(u, v, false);
            }
            EventType::LinkRestore { u, v } => {
                self.schedule_next_traffic(ctx);
                self.set_link(u, v, true);
            }
        }
    }
}
