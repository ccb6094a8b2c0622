//! # Frame Envelope
//!
//! Outbound frames are flat JSON objects: `type`, `agent_id`, `timestamp`,
//! the message's own fields, and, when a key is available, a `signature`
//! over the canonical encoding of everything else.

use crate::algorithms::canonical::encode_canonical;
use crate::algorithms::passport_codec::verify;
use crate::domain::errors::{SecurityFault, TraversalError};
use crate::domain::identity::AgentKeys;
use crate::domain::messages::OutboundMessage;
use serde_json::{Map, Number, Value};

/// Build the wire text for `message`.
pub fn build_frame(
    message: &OutboundMessage,
    agent_id: &str,
    timestamp: f64,
    keys: Option<&AgentKeys>,
) -> Result<String, TraversalError> {
    let timestamp = Number::from_f64(timestamp)
        .ok_or_else(|| TraversalError::Protocol("non-finite frame timestamp".into()))?;

    let mut frame = Map::new();
    frame.insert("type".into(), Value::String(message.kind().into()));
    frame.insert("agent_id".into(), Value::String(agent_id.into()));
    frame.insert("timestamp".into(), Value::Number(timestamp));
    frame.extend(message.payload()?);

    let mut frame = Value::Object(frame);
    if let Some(keys) = keys {
        let signature = keys.sign(&encode_canonical(&frame)?);
        if let Some(fields) = frame.as_object_mut() {
            fields.insert("signature".into(), Value::String(signature));
        }
    }

    serde_json::to_string(&frame).map_err(|e| TraversalError::Protocol(e.to_string()))
}

/// Check the `signature` of a received frame against `public_key_b64`.
pub fn verify_frame(frame: &Value, public_key_b64: &str) -> Result<bool, TraversalError> {
    let mut fields = frame
        .as_object()
        .cloned()
        .ok_or_else(|| TraversalError::Protocol("frame is not an object".into()))?;
    let signature = match fields.remove("signature") {
        Some(Value::String(s)) => s,
        Some(_) => {
            return Err(SecurityFault::MalformedSignature("signature is not a string".into()).into())
        }
        None => return Err(SecurityFault::MissingSignature.into()),
    };
    verify(&encode_canonical(&Value::Object(fields))?, &signature, public_key_b64)
}
