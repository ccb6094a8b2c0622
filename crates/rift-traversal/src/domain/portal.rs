//! # Portal
//!
//! A discoverable link from the current world to a destination world.
//!
//! Worlds describe portals loosely: the id may arrive as `id` or
//! `portal_id`, and everything but the id has a fallback.

use crate::domain::passport::Position;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder used for missing descriptive fields.
pub const UNKNOWN: &str = "unknown";

/// A discovered portal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "PortalDescriptor")]
pub struct Portal {
    /// Unique within the discovery result.
    pub portal_id: String,
    /// Display name.
    pub name: String,
    /// Destination world id.
    pub destination_world: String,
    /// Address to connect to after a confirmed handoff. May be empty.
    #[serde(rename = "destination_url")]
    pub destination_address: String,
    /// Where the portal sits in the current world.
    pub position: Position,
    /// Whether the destination insists on signed passports.
    pub requires_auth: bool,
    /// World-specific extras.
    pub metadata: Map<String, Value>,
}

impl Portal {
    /// Portal with only the required fields set.
    pub fn new(
        portal_id: impl Into<String>,
        destination_world: impl Into<String>,
        destination_address: impl Into<String>,
    ) -> Self {
        let portal_id = portal_id.into();
        Self {
            name: portal_id.clone(),
            portal_id,
            destination_world: destination_world.into(),
            destination_address: destination_address.into(),
            position: Position::default(),
            requires_auth: false,
            metadata: Map::new(),
        }
    }

    /// Set the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The destination address, when the world supplied a non-empty one.
    pub fn address(&self) -> Option<&str> {
        Some(self.destination_address.as_str()).filter(|a| !a.trim().is_empty())
    }
}

/// Lenient wire form of a portal.
#[derive(Debug, Deserialize)]
struct PortalDescriptor {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    portal_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    destination_world: Option<String>,
    #[serde(default)]
    destination_url: Option<String>,
    #[serde(default)]
    position: Position,
    #[serde(default)]
    requires_auth: bool,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl From<PortalDescriptor> for Portal {
    fn from(d: PortalDescriptor) -> Self {
        Self {
            portal_id: d.id.or(d.portal_id).unwrap_or_else(|| UNKNOWN.to_string()),
            name: d.name.unwrap_or_else(|| "Unnamed Portal".to_string()),
            destination_world: d.destination_world.unwrap_or_else(|| UNKNOWN.to_string()),
            destination_address: d.destination_url.unwrap_or_default(),
            position: d.position,
            requires_auth: d.requires_auth,
            metadata: d.metadata,
        }
    }
}
