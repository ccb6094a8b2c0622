//! # Passport
//!
//! The identity/state document an agent carries across a portal.
//!
//! A `Passport` is immutable once sealed. To change a field, turn it back
//! into a [`PassportDraft`], which drops any signature.

use crate::domain::unix_timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reputation a fresh passport starts with.
pub const DEFAULT_REPUTATION: f64 = 1.0;

fn default_reputation() -> f64 {
    DEFAULT_REPUTATION
}

/// 3D position inside a world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl Position {
    /// Construct a position.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// All three coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// A sealed passport. Field names match the wire representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Passport {
    agent_id: String,
    agent_name: String,
    source_world: String,
    target_world: String,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    inventory_hash: String,
    #[serde(default)]
    memory_summary: String,
    #[serde(default = "default_reputation")]
    reputation: f64,
    timestamp: f64,
    nonce: String,
    #[serde(default)]
    signature: Option<String>,
}

impl Passport {
    /// Agent id.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Agent name.
    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// World the agent is leaving.
    pub fn source_world(&self) -> &str {
        &self.source_world
    }

    /// World the agent is heading to.
    pub fn target_world(&self) -> &str {
        &self.target_world
    }

    /// Position at departure.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Opaque inventory digest.
    pub fn inventory_hash(&self) -> &str {
        &self.inventory_hash
    }

    /// Free-text memory summary.
    pub fn memory_summary(&self) -> &str {
        &self.memory_summary
    }

    /// Reputation score.
    pub fn reputation(&self) -> f64 {
        self.reputation
    }

    /// Creation time, Unix seconds.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Single-use nonce.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Base64 Ed25519 signature, if sealed with a key.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    /// True when a signature is attached.
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Every float field is finite and therefore encodable.
    pub fn is_encodable(&self) -> bool {
        self.position.is_finite() && self.reputation.is_finite() && self.timestamp.is_finite()
    }

    /// Back to an editable draft. The signature is discarded.
    pub fn into_draft(self) -> PassportDraft {
        PassportDraft {
            agent_id: self.agent_id,
            agent_name: self.agent_name,
            source_world: self.source_world,
            target_world: self.target_world,
            position: self.position,
            inventory_hash: self.inventory_hash,
            memory_summary: self.memory_summary,
            reputation: self.reputation,
            timestamp: self.timestamp,
            nonce: self.nonce,
        }
    }

    pub(crate) fn with_signature(mut self, signature: String) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// Editable passport contents, before sealing.
#[derive(Clone, Debug, PartialEq)]
pub struct PassportDraft {
    /// Agent id.
    pub agent_id: String,
    /// Agent name.
    pub agent_name: String,
    /// World being left.
    pub source_world: String,
    /// World being entered.
    pub target_world: String,
    /// Position at departure.
    pub position: Position,
    /// Opaque inventory digest.
    pub inventory_hash: String,
    /// Free-text memory summary.
    pub memory_summary: String,
    /// Reputation score.
    pub reputation: f64,
    /// Creation time, Unix seconds.
    pub timestamp: f64,
    /// Single-use nonce.
    pub nonce: String,
}

impl PassportDraft {
    /// Fresh draft stamped with the current time and a new nonce.
    pub fn new(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        source_world: impl Into<String>,
        target_world: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            source_world: source_world.into(),
            target_world: target_world.into(),
            position: Position::default(),
            inventory_hash: String::new(),
            memory_summary: String::new(),
            reputation: DEFAULT_REPUTATION,
            timestamp: unix_timestamp(),
            nonce: Uuid::new_v4().to_string(),
        }
    }

    /// Apply caller-supplied details; unset ones keep their current value.
    pub fn with_details(mut self, details: TraversalDetails) -> Self {
        if let Some(position) = details.position {
            self.position = position;
        }
        if let Some(inventory_hash) = details.inventory_hash {
            self.inventory_hash = inventory_hash;
        }
        if let Some(memory_summary) = details.memory_summary {
            self.memory_summary = memory_summary;
        }
        if let Some(reputation) = details.reputation {
            self.reputation = reputation;
        }
        self
    }

    /// Seal without a signature.
    pub fn seal_unsigned(self) -> Passport {
        Passport {
            agent_id: self.agent_id,
            agent_name: self.agent_name,
            source_world: self.source_world,
            target_world: self.target_world,
            position: self.position,
            inventory_hash: self.inventory_hash,
            memory_summary: self.memory_summary,
            reputation: self.reputation,
            timestamp: self.timestamp,
            nonce: self.nonce,
            signature: None,
        }
    }
}

/// Optional passport fields supplied by the caller of `enter`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraversalDetails {
    /// Departure position.
    pub position: Option<Position>,
    /// Inventory digest.
    pub inventory_hash: Option<String>,
    /// Memory summary.
    pub memory_summary: Option<String>,
    /// Reputation override.
    pub reputation: Option<f64>,
}

impl TraversalDetails {
    /// Set the departure position.
    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Set the inventory digest.
    pub fn inventory_hash(mut self, hash: impl Into<String>) -> Self {
        self.inventory_hash = Some(hash.into());
        self
    }

    /// Set the memory summary.
    pub fn memory_summary(mut self, summary: impl Into<String>) -> Self {
        self.memory_summary = Some(summary.into());
        self
    }

    /// Set the reputation.
    pub fn reputation(mut self, reputation: f64) -> Self {
        self.reputation = Some(reputation);
        self
    }
}
