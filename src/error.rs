//! Structured error types for qroute.
//!
//! Fallible public APIs return `Result<T, RouteError>`. Only configuration,
//! topology and I/O failures are fatal to a run; per-packet failures are
//! reported through metrics as [`DropReason`]s and never surface here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Malformed or out-of-range configuration. Reported before any
    /// simulation step runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An edge list or generator result that is not a valid network.
    #[error("topology error: {0}")]
    Topology(String),

    /// Policy state could not be exported or imported.
    #[error("policy state error: {0}")]
    State(String),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RouteError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        RouteError::Config(msg.into())
    }
}

/// Convenience alias for `Result<T, RouteError>`.
pub type RouteResult<T> = Result<T, RouteError>;

/// Why a packet ended in the `Dropped` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// The node had no live neighbor to forward to.
    RoutingDeadEnd,
    /// The packet reached the configured hop limit before delivery.
    HopLimitExceeded,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::RoutingDeadEnd => write!(f, "dead end"),
            DropReason::HopLimitExceeded => write!(f, "hop limit exceeded"),
        }
    }
}
