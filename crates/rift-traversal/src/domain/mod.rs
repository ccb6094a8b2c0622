//! # Domain Module
//!
//! Core domain types for cross-world traversal: passports, portals, the
//! traversal state machine, wire messages, configuration, and the two
//! shared structures the receive loop writes into (portal registry and
//! pending-operation table).

pub mod config;
pub mod correlation;
pub mod errors;
pub mod identity;
pub mod messages;
pub mod passport;
pub mod pending;
pub mod portal;
pub mod registry;
pub mod results;
pub mod state;

pub use config::*;
pub use correlation::CorrelationId;
pub use errors::*;
pub use identity::{decode_public_key, AgentIdentity, AgentKeys};
pub use messages::*;
pub use passport::*;
pub use pending::*;
pub use portal::*;
pub use registry::PortalRegistry;
pub use results::*;
pub use state::TraversalState;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in fractional seconds.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
