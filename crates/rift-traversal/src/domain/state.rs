//! # Traversal State
//!
//! The coordinator's state machine.
//!
//! ```text
//! Disconnected → Connecting → Connected ⇄ Discovering
//!                                 │
//!                                 ↓
//!                          HandoffPending → Transitioning → Arrived
//! ```
//!
//! Any state may fall back to `Disconnected`; `Discovering`, `HandoffPending`
//! and `Transitioning` may fall back to `Connected`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current traversal state. Exactly one is current at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalState {
    /// No world session. Initial and universal reset state.
    #[default]
    Disconnected,
    /// Transport being established, welcome not yet received.
    Connecting,
    /// Welcome received; world session usable.
    Connected,
    /// Discovery request in flight.
    Discovering,
    /// Handoff request in flight.
    HandoffPending,
    /// Confirmation verified, moving to the destination world.
    Transitioning,
    /// Session established with the destination world.
    Arrived,
}

impl TraversalState {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: TraversalState) -> bool {
        use TraversalState::*;
        match (self, next) {
            (_, Disconnected) => true,
            (Disconnected, Connecting) => true,
            (Connected | Arrived, Connecting) => true, // reconnect elsewhere
            (Connecting, Connected) => true,
            (Connected | Arrived, Discovering) => true,
            (Discovering, Connected) => true,
            (Connected | Arrived, HandoffPending) => true,
            (HandoffPending, Transitioning) => true,
            (HandoffPending, Connected) => true,
            (Transitioning, Connected) => true,
            (Transitioning, Arrived) => true,
            _ => false,
        }
    }

    /// True when a world session is usable ("Connected or later").
    pub fn has_session(&self) -> bool {
        !matches!(self, Self::Disconnected | Self::Connecting)
    }

    /// Wire/status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Discovering => "discovering",
            Self::HandoffPending => "handoff_pending",
            Self::Transitioning => "transitioning",
            Self::Arrived => "arrived",
        }
    }
}

impl fmt::Display for TraversalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
