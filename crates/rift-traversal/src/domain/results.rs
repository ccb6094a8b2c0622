//! Outcome and status snapshots returned to callers.

use crate::domain::state::TraversalState;
use serde::{Deserialize, Serialize};

/// Result of a completed `enter`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraversalResult {
    /// World left.
    pub source_world: String,
    /// Destination world named by the portal.
    pub destination_world: String,
    /// Address actually connected to.
    pub destination_address: String,
    /// World name from the destination's welcome.
    pub arrived_world: String,
    /// SHA-256 hex of the canonical passport that was sent.
    pub passport_hash: String,
    /// Transition prose, when narration is enabled.
    pub narration: Option<String>,
}

/// Point-in-time view of the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraversalStatus {
    /// Agent id.
    pub agent_id: String,
    /// Agent name.
    pub agent_name: String,
    /// Current state.
    pub state: TraversalState,
    /// Whether the link is live.
    pub connected: bool,
    /// World of the current session.
    pub current_world: Option<String>,
    /// Address of the current session.
    pub current_address: Option<String>,
    /// Portals in the registry.
    pub discovered_portals: usize,
    /// Base64 public key, when a signing key is loaded.
    pub public_key: Option<String>,
    /// Whether signatures are enforced.
    pub require_signatures: bool,
}
