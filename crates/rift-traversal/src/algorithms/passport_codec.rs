//! # Passport Codec
//!
//! Canonical bytes, content hash, signing and verification of passports.
//! The signature field is never part of the signed bytes.

use crate::algorithms::canonical::encode_canonical;
use crate::domain::errors::{SecurityFault, TraversalError};
use crate::domain::identity::{decode_public_key, AgentKeys};
use crate::domain::passport::Passport;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Verifier};
use sha2::{Digest, Sha256};

/// Canonical encoding of every field except `signature`.
pub fn canonicalize(passport: &Passport) -> Result<Vec<u8>, TraversalError> {
    if !passport.is_encodable() {
        return Err(TraversalError::Protocol(
            "passport contains a non-finite number".into(),
        ));
    }
    let mut value = serde_json::to_value(passport)
        .map_err(|e| TraversalError::Protocol(format!("passport: {e}")))?;
    if let Some(fields) = value.as_object_mut() {
        fields.remove("signature");
    }
    encode_canonical(&value)
}

/// SHA-256 hex of the canonical bytes.
pub fn content_hash(passport: &Passport) -> Result<String, TraversalError> {
    let canonical = canonicalize(passport)?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Seal `passport` with a fresh signature. Any existing signature is
/// replaced.
pub fn sign(passport: Passport, keys: &AgentKeys) -> Result<Passport, TraversalError> {
    let canonical = canonicalize(&passport)?;
    let signature = keys.sign(&canonical);
    Ok(passport.with_signature(signature))
}

/// Check a base64 signature over `message` against a base64 public key.
///
/// Malformed inputs are errors; a well-formed signature that does not
/// match is `Ok(false)`.
pub fn verify(
    message: &[u8],
    signature_b64: &str,
    public_key_b64: &str,
) -> Result<bool, TraversalError> {
    let raw = BASE64
        .decode(signature_b64.trim())
        .map_err(|e| SecurityFault::MalformedSignature(format!("not base64: {e}")))?;
    let raw: [u8; 64] = raw.as_slice().try_into().map_err(|_| {
        SecurityFault::MalformedSignature(format!("expected 64 bytes, got {}", raw.len()))
    })?;
    let key = decode_public_key(public_key_b64)?;
    let signature = Signature::from_bytes(&raw);
    Ok(key.verify(message, &signature).is_ok())
}

/// Verify a passport's own signature.
pub fn verify_passport(passport: &Passport, public_key_b64: &str) -> Result<bool, TraversalError> {
    let signature = passport
        .signature()
        .ok_or(SecurityFault::MissingSignature)?;
    verify(&canonicalize(passport)?, signature, public_key_b64)
}
