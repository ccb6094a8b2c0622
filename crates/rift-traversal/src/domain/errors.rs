//! # Domain Errors
//!
//! Error taxonomy for the traversal coordinator.
//!
//! | Class | Surfaced | Retried |
//! |-------|----------|---------|
//! | Connection | always | up to `max_retries` on connect |
//! | Security | always when enforcement is on | never |
//! | Handoff | always, state reverted | never |
//! | Protocol | logged and dropped by the receive loop | never |

use thiserror::Error;

/// Top-level error for every traversal operation.
#[derive(Debug, Error)]
pub enum TraversalError {
    /// Transport unreachable, handshake timeout, retries exhausted, link lost.
    #[error("Connection fault: {0}")]
    Connection(#[from] ConnectionFault),

    /// Missing, invalid or malformed signature; unusable key material.
    #[error("Security fault: {0}")]
    Security(#[from] SecurityFault),

    /// Unknown portal, explicit rejection, confirmation timeout.
    #[error("Handoff fault: {0}")]
    Handoff(#[from] HandoffFault),

    /// Malformed or unencodable frame.
    #[error("Protocol fault: {0}")]
    Protocol(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TraversalError {
    /// True for connection faults.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// True for security faults.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::Security(_))
    }

    /// True for handoff faults.
    pub fn is_handoff(&self) -> bool {
        matches!(self, Self::Handoff(_))
    }
}

/// Connection-level failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionFault {
    /// An operation needing a live world session was called without one.
    #[error("Not connected to any world")]
    NotConnected,

    /// Neither an explicit address nor a default world was available.
    #[error("No world address provided")]
    NoAddress,

    /// The transport could not reach the address.
    #[error("World unreachable at {address}: {reason}")]
    Unreachable {
        /// Address that was dialled.
        address: String,
        /// Transport-level reason.
        reason: String,
    },

    /// Transport opened but no welcome arrived within the connection timeout.
    #[error("No welcome from {address} within {timeout_ms}ms")]
    HandshakeTimeout {
        /// Address that was dialled.
        address: String,
        /// Connection timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Every connect attempt failed.
    #[error("Failed to connect after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: String,
    },

    /// A disconnect was requested while a connect was in flight.
    #[error("Connect to {address} interrupted by disconnect")]
    Interrupted {
        /// Address that was being dialled.
        address: String,
    },

    /// The live link closed while an operation was waiting on it.
    #[error("Connection to world lost")]
    ConnectionLost,

    /// The frame could not be handed to the transport.
    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// Signature and key failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SecurityFault {
    /// Signature required but absent.
    #[error("Missing signature in handoff response")]
    MissingSignature,

    /// Signature is not valid base64 or not 64 bytes.
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// Public key is not valid base64 or not a curve point.
    #[error("Malformed public key: {0}")]
    MalformedPublicKey(String),

    /// Signature present but no key to check it against.
    #[error("No public key known for signer of {0}")]
    UnknownSigner(String),

    /// Signatures are mandatory and no signing key is loaded.
    #[error("Cannot create unsigned passport when signatures are required")]
    UnsignedPassportRefused,

    /// Well-formed signature that does not match.
    #[error("Handoff signature validation failed: {0}")]
    VerificationFailed(String),

    /// Key file unreadable or rejected by the signing primitive.
    #[error("Signing key unavailable: {0}")]
    KeyUnavailable(String),
}

/// Handoff-level failures. State is reverted before these are returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandoffFault {
    /// Portal id not present in the registry.
    #[error("Portal {0} not found. Run discover() first.")]
    UnknownPortal(String),

    /// The world rejected the request or reported an error.
    #[error("Handoff rejected: {0}")]
    Rejected(String),

    /// No confirmation within the handoff timeout.
    #[error("Handoff timeout after {timeout_ms}ms")]
    Timeout {
        /// Handoff timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The handoff request could not be sent.
    #[error("Failed to send handoff request: {0}")]
    SendFailed(String),

    /// Neither the portal nor the confirmation named a destination address.
    #[error("No destination address for world {0}")]
    NoDestinationAddress(String),

    /// The confirmation echoed a passport other than the one in flight.
    #[error("Confirmation does not match the in-flight passport")]
    ConfirmationMismatch,

    /// Handoff confirmed but connecting to the destination failed.
    #[error("Arrival failed: {0}")]
    ArrivalFailed(String),
}

/// Configuration failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field holds an unusable value.
    #[error("Invalid {field}: {reason}")]
    Invalid {
        /// Field path, e.g. `connection.max_retries`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// Config file could not be read.
    #[error("Failed to read config {path}: {reason}")]
    Read {
        /// File path.
        path: String,
        /// I/O error text.
        reason: String,
    },

    /// Config file is not valid TOML for `TraversalConfig`.
    #[error("Failed to parse config: {0}")]
    Parse(String),
}
