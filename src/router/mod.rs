//! The simulated router network.
//!
//! Routers communicate exclusively through events. A packet waits in its
//! node's FIFO queue, is processed for `pkg_process_delay`, is forwarded
//! to the neighbor the node's policy picks and crosses the link in its
//! latency. When it reaches the neighbor, the sending node's policy is
//! told how long the hop took.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`packet`] | [`PacketId`], [`Packet`], [`PacketState`] |
//! | [`node`] | [`RouterNode`] (policy + queue) |
//! | [`trace`] | [`HopRecord`] struct |
//! | [`environment`] | [`RouterEnvironment`] event handler |

pub mod environment;
pub mod node;
pub mod packet;
pub mod trace;

pub use environment::RouterEnvironment;
pub use node::RouterNode;
pub use packet::{Location, Packet, PacketId, PacketState};
pub use trace::HopRecord;
