//! # Agent Identity
//!
//! The agent's stable id and name, plus its Ed25519 signing key.
//!
//! Key files hold the base64-encoded 32-byte seed on a single line.

use crate::domain::errors::SecurityFault;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

/// Who is travelling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentIdentity {
    /// Stable across the agent's lifetime.
    pub agent_id: String,
    /// Human-readable label.
    pub agent_name: String,
}

impl AgentIdentity {
    /// Use `agent_id` when given, otherwise mint a random one.
    pub fn new(agent_id: Option<String>, agent_name: impl Into<String>) -> Self {
        let agent_id = agent_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            agent_id,
            agent_name: agent_name.into(),
        }
    }
}

/// Ed25519 key pair used to sign passports and outbound frames.
pub struct AgentKeys {
    signing_key: SigningKey,
}

impl AgentKeys {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    /// Build from a raw 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Decode a base64 seed.
    pub fn from_base64_seed(encoded: &str) -> Result<Self, SecurityFault> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| SecurityFault::KeyUnavailable(format!("seed is not base64: {e}")))?;
        let seed: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            SecurityFault::KeyUnavailable(format!("seed must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Load the key at `path`, or generate one and try to persist it there.
    ///
    /// A file that exists but cannot be decoded is an error, never silently
    /// replaced. Failure to persist a new key only logs a warning; the key
    /// is then ephemeral.
    pub fn load_or_generate(path: Option<&Path>) -> Result<Self, SecurityFault> {
        let Some(path) = path else {
            info!("[rift] No key path configured, using ephemeral signing key");
            return Ok(Self::generate());
        };

        if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| {
                SecurityFault::KeyUnavailable(format!("{}: {e}", path.display()))
            })?;
            let keys = Self::from_base64_seed(&contents)?;
            info!(path = %path.display(), "[rift] Loaded signing key");
            return Ok(keys);
        }

        let keys = Self::generate();
        let persisted = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::write(path, keys.to_base64_seed()));
        match persisted {
            Ok(()) => info!(path = %path.display(), "[rift] Generated new signing key"),
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "[rift] Could not save signing key, continuing with ephemeral key"
            ),
        }
        Ok(keys)
    }

    /// Base64 of the 32-byte seed, as written to key files.
    pub fn to_base64_seed(&self) -> String {
        BASE64.encode(self.signing_key.to_bytes())
    }

    /// Public half.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Base64 of the 32-byte public key, for sharing with worlds.
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.verifying_key().to_bytes())
    }

    /// Sign `message`, returning the base64 signature.
    pub fn sign(&self, message: &[u8]) -> String {
        BASE64.encode(self.signing_key.sign(message).to_bytes())
    }
}

impl fmt::Debug for AgentKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentKeys")
            .field("public_key", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}

/// Decode a base64 Ed25519 public key.
pub fn decode_public_key(encoded: &str) -> Result<VerifyingKey, SecurityFault> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| SecurityFault::MalformedPublicKey(format!("not base64: {e}")))?;
    let raw: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        SecurityFault::MalformedPublicKey(format!("expected 32 bytes, got {}", bytes.len()))
    })?;
    VerifyingKey::from_bytes(&raw).map_err(|e| SecurityFault::MalformedPublicKey(e.to_string()))
}
