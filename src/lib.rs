//! # qroute: deterministic adaptive routing simulator
//!
//! A discrete-event simulation of a packet-switched network whose routers
//! learn where to forward packets from the delays they observe. Every run
//! is a pure function of its configuration and seed: no threads, no
//! wall-clock time, one virtual clock.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │         RouterEnvironment           │ ← queues, links, feedback
//! │  ┌───────────────┐ ┌─────────────┐  │
//! │  │ RouterNode ×n │ │   Traffic   │  │ ← per-node policies, lazy arrivals
//! │  │ RoutingPolicy │ │  Scheduler  │  │
//! │  └───────────────┘ └─────────────┘  │
//! │  ┌───────────────────────────────┐  │
//! │  │          Simulation           │  │ ← execution loop
//! │  │  ┌───────────┐ ┌───────────┐  │  │
//! │  │  │ Scheduler │ │   VTime   │  │  │ ← min-heap, virtual clock
//! │  │  └───────────┘ └───────────┘  │  │
//! │  └───────────────────────────────┘  │
//! │  Reporter                           │ ← records, summary, fingerprint
//! └─────────────────────────────────────┘
//! ```
//!
//! Use [`RouterBuilder`] to go from a [`Config`] to a running simulation.

pub mod builder;
pub mod config;
pub mod embedding;
pub mod error;
pub mod event;
pub mod features;
pub mod metrics;
pub mod nn;
pub mod policy;
pub mod router;
pub mod scheduler;
pub mod simulation;
pub mod time;
pub mod topology;
pub mod traffic;

// Re-exports for convenience.
pub use builder::RouterBuilder;
pub use config::Config;
pub use error::{DropReason, RouteError, RouteResult};
pub use event::{Event, EventId, EventIdGen, EventType};
pub use metrics::{PacketRecord, RunSummary};
pub use policy::{PolicyKind, RoutingPolicy};
pub use router::{Packet, PacketId, RouterEnvironment, RouterNode};
pub use scheduler::Scheduler;
pub use simulation::{EventHandler, Simulation, SimulationContext};
pub use time::VirtualTime;
pub use topology::{Graph, NodeId};
