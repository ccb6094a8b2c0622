//! # Rift Traversal
//!
//! Lets an autonomous agent hold a session with one world at a time,
//! discover that world's portals, and pass through a portal into another
//! world by presenting a signed passport and receiving a signed
//! confirmation.
//!
//! **Architecture:** Hexagonal (Ports/Adapters)
//!
//! ## Traversal Sequence
//!
//! ```text
//! connect ──► welcome ──► discover ──► portals
//!                                        │
//!   enter(portal) ──► handoff_request ───┘
//!        │
//!        ▼
//!   handoff_confirm ──verify──► disconnect source ──► connect destination ──► Arrived
//! ```
//!
//! ## Security
//!
//! | Check | Where |
//! |-------|-------|
//! | Passports signed with the agent's Ed25519 key | `algorithms::passport_codec` |
//! | Outbound frames signed over their canonical encoding | `algorithms::envelope` |
//! | Confirmations verified against pinned or advertised world keys | `algorithms::handoff` |
//! | Confirmation must echo the in-flight passport nonce | `service` |
//!
//! ## Module Structure
//!
//! ```text
//! rift-traversal/
//! ├── domain/          # Passport, Portal, state machine, messages, config, pending table
//! ├── algorithms/      # Canonical encoding, signing, verification, narration
//! ├── ports/           # TraversalApi, WorldTransport, TransitionNarrator
//! ├── adapters/        # WebSocket and in-memory transports
//! └── service/         # TraversalService, connection manager, dispatcher
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{InMemoryTransport, WebSocketTransport};
pub use algorithms::{canonicalize, content_hash, HandoffVerifier, RealmNarrator};
pub use domain::{
    AgentIdentity, AgentKeys, ConfigError, ConnectionFault, HandoffConfirm, HandoffFault,
    Passport, PassportDraft, Portal, Position, SecurityFault, TraversalConfig, TraversalDetails,
    TraversalError, TraversalResult, TraversalState, TraversalStatus, WelcomeInfo,
};
pub use ports::{TransitionNarrator, TraversalApi, WorldTransport};
pub use service::{TraversalService, TraversalServiceBuilder};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
