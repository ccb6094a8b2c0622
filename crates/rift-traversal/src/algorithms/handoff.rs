//! # Handoff Verification
//!
//! Decides whether a `handoff_confirm` may be acted on.
//!
//! The signer's key comes from the pinned `trusted_world_keys` entry for
//! the passport's target world, or failing that from the confirmation's
//! own `sender_public_key`. The signature covers the canonical encoding
//! of the echoed passport. Worlds differ on whether that encoding drops
//! the passport's own signature field or keeps it as received, so both
//! are accepted.

use crate::algorithms::canonical::to_canonical_bytes;
use crate::algorithms::passport_codec::{canonicalize, verify};
use crate::domain::config::SecurityConfig;
use crate::domain::errors::{SecurityFault, TraversalError};
use crate::domain::messages::HandoffConfirm;
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Verification policy for handoff confirmations.
#[derive(Clone, Debug, Default)]
pub struct HandoffVerifier {
    require_signatures: bool,
    trusted_world_keys: HashMap<String, String>,
}

impl HandoffVerifier {
    /// Policy with no pinned keys.
    pub fn new(require_signatures: bool) -> Self {
        Self {
            require_signatures,
            trusted_world_keys: HashMap::new(),
        }
    }

    /// Policy from security config.
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            require_signatures: config.require_signatures,
            trusted_world_keys: config.trusted_world_keys.clone(),
        }
    }

    /// Pin `public_key_b64` as the signer for `world`.
    pub fn trust(mut self, world: impl Into<String>, public_key_b64: impl Into<String>) -> Self {
        self.trusted_world_keys
            .insert(world.into(), public_key_b64.into());
        self
    }

    /// Whether signatures are enforced.
    pub fn require_signatures(&self) -> bool {
        self.require_signatures
    }

    /// `Ok(true)` when the confirmation may be acted on, `Ok(false)` when
    /// it must not be. With enforcement on, anything short of a valid
    /// signature is an error or `false`.
    pub fn verify_handoff(&self, confirm: &HandoffConfirm) -> Result<bool, TraversalError> {
        let Some(signature) = confirm.signature.as_deref() else {
            if self.require_signatures {
                error!("[rift] Handoff confirmation carries no signature");
                return Err(SecurityFault::MissingSignature.into());
            }
            warn!("[rift] No signature in handoff confirmation, signatures not required");
            return Ok(true);
        };

        let Some(passport) = confirm.passport.as_ref() else {
            if self.require_signatures {
                return Err(SecurityFault::VerificationFailed(
                    "confirmation carries no passport".into(),
                )
                .into());
            }
            warn!("[rift] Signed confirmation without a passport, nothing to verify");
            return Ok(false);
        };

        let world = passport.target_world();
        let key = self
            .trusted_world_keys
            .get(world)
            .map(String::as_str)
            .or(confirm.sender_public_key.as_deref());
        let Some(key) = key else {
            if self.require_signatures {
                return Err(SecurityFault::UnknownSigner(world.to_string()).into());
            }
            warn!(world, "[rift] No public key for signer, accepting unverified");
            return Ok(true);
        };

        let mut verified = verify(&canonicalize(passport)?, signature, key);
        if matches!(verified, Ok(false)) && passport.is_signed() {
            verified = verify(&to_canonical_bytes(passport)?, signature, key);
        }
        match verified {
            Ok(true) => {
                info!(world, "[rift] Handoff signature verified");
                Ok(true)
            }
            Ok(false) => {
                error!(world, "[rift] Invalid handoff signature");
                Ok(false)
            }
            Err(e) if !self.require_signatures => {
                warn!(world, error = %e, "[rift] Unverifiable handoff signature");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
