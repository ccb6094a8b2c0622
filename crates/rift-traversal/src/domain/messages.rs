//! # Wire Messages
//!
//! Every frame is a JSON object whose `type` field names its kind. Inbound
//! kinds form a closed set; anything else is `Unknown` and goes to a custom
//! handler or is discarded.

use crate::domain::errors::TraversalError;
use crate::domain::passport::Passport;
use crate::domain::portal::Portal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Sent by a world immediately after the transport opens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WelcomeInfo {
    /// World id.
    #[serde(default = "unnamed_world")]
    pub world_name: String,
    /// World software version.
    #[serde(default = "unknown_version")]
    pub version: String,
    /// Advertised capabilities.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn unnamed_world() -> String {
    "Unknown".to_string()
}

fn unknown_version() -> String {
    "unknown".to_string()
}

/// Destination's acceptance of a handoff.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoffConfirm {
    /// The passport as the destination saw it.
    #[serde(default)]
    pub passport: Option<Passport>,
    /// Destination's base64 signature over the canonical passport.
    #[serde(default)]
    pub signature: Option<String>,
    /// Destination's base64 public key.
    #[serde(default)]
    pub sender_public_key: Option<String>,
    /// Where to connect if the portal named no address.
    #[serde(default)]
    pub target_url: Option<String>,
}

/// Body of `handoff_rejected` and `error` frames.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldNotice {
    /// Free-form message.
    #[serde(default)]
    pub message: Option<String>,
    /// Short reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Longer explanation.
    #[serde(default)]
    pub details: Option<String>,
    /// World-specific code; may be a string or a number.
    #[serde(default)]
    pub code: Option<Value>,
}

impl WorldNotice {
    /// Best human-readable text in the notice.
    pub fn text(&self) -> String {
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            return message.to_string();
        }
        match (self.reason.as_deref(), self.details.as_deref()) {
            (Some(r), Some(d)) => format!("{r}: {d}"),
            (Some(r), None) => r.to_string(),
            (None, Some(d)) => d.to_string(),
            (None, None) => "Unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscoverResponseBody {
    #[serde(default)]
    portals: Vec<Portal>,
}

/// A parsed inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// `welcome`
    Welcome(WelcomeInfo),
    /// `discover_response`
    DiscoverResponse(Vec<Portal>),
    /// `handoff_confirm`
    HandoffConfirm(HandoffConfirm),
    /// `handoff_rejected`
    HandoffRejected(WorldNotice),
    /// `error`
    Error(WorldNotice),
    /// `pong`
    Pong,
    /// Any other kind, with the full frame.
    Unknown {
        /// Value of the `type` field.
        kind: String,
        /// Whole frame.
        body: Value,
    },
}

impl InboundMessage {
    /// Parse a text frame.
    pub fn parse(frame: &str) -> Result<Self, TraversalError> {
        let value: Value = serde_json::from_str(frame)
            .map_err(|e| TraversalError::Protocol(format!("invalid JSON: {e}")))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TraversalError::Protocol("frame has no string `type`".into()))?
            .to_string();

        let message = match kind.as_str() {
            "welcome" => Self::Welcome(typed(&kind, value)?),
            "discover_response" => {
                Self::DiscoverResponse(typed::<DiscoverResponseBody>(&kind, value)?.portals)
            }
            "handoff_confirm" => Self::HandoffConfirm(typed(&kind, value)?),
            "handoff_rejected" => Self::HandoffRejected(typed(&kind, value)?),
            "error" => Self::Error(typed(&kind, value)?),
            "pong" => Self::Pong,
            _ => Self::Unknown { kind, body: value },
        };
        Ok(message)
    }

    /// Wire kind.
    pub fn kind(&self) -> &str {
        match self {
            Self::Welcome(_) => "welcome",
            Self::DiscoverResponse(_) => "discover_response",
            Self::HandoffConfirm(_) => "handoff_confirm",
            Self::HandoffRejected(_) => "handoff_rejected",
            Self::Error(_) => "error",
            Self::Pong => "pong",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

fn typed<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Result<T, TraversalError> {
    serde_json::from_value(value)
        .map_err(|e| TraversalError::Protocol(format!("malformed {kind}: {e}")))
}

/// Frames the agent sends.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    /// Ask the world for its portals.
    Discover,
    /// Ask to pass through a portal.
    HandoffRequest {
        /// Portal being entered.
        portal_id: String,
        /// Signed (or unsigned) passport.
        passport: Passport,
    },
    /// Liveness check.
    Ping,
}

impl OutboundMessage {
    /// Wire kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::HandoffRequest { .. } => "handoff_request",
            Self::Ping => "ping",
        }
    }

    /// Kind-specific fields, merged flat into the frame.
    pub fn payload(&self) -> Result<Map<String, Value>, TraversalError> {
        let mut payload = Map::new();
        if let Self::HandoffRequest {
            portal_id,
            passport,
        } = self
        {
            let passport = serde_json::to_value(passport)
                .map_err(|e| TraversalError::Protocol(format!("passport: {e}")))?;
            payload.insert("portal_id".into(), Value::String(portal_id.clone()));
            payload.insert("passport".into(), passport);
        }
        Ok(payload)
    }
}
