//! # Algorithms
//!
//! Pure functions over domain types: the canonical byte encoding that
//! signatures cover, passport signing and verification, outbound frame
//! construction, handoff verification policy, and transition narration.

pub mod canonical;
pub mod envelope;
pub mod handoff;
pub mod narration;
pub mod passport_codec;

pub use canonical::{encode_canonical, to_canonical_bytes};
pub use envelope::{build_frame, verify_frame};
pub use handoff::HandoffVerifier;
pub use narration::RealmNarrator;
pub use passport_codec::{canonicalize, content_hash, sign, verify, verify_passport};
