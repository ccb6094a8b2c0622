//! # Traversal Service
//!
//! The coordinator agents drive, implementing the `TraversalApi` port.
//!
//! ## Concurrency
//!
//! Each live link has one receive loop. It is the only writer of the
//! portal registry and the only resolver of pending waits. Coordinator
//! methods are the only writers of `TraversalState`. `connect`, `discover`
//! and `enter` are serialized; `disconnect` is not, so it can interrupt an
//! operation that is waiting on the link, including a connect that is still
//! dialling or waiting for the welcome.

// Semantic submodules
mod api;
mod connection;
mod core;
mod dispatcher;

// Re-export public API
pub use self::core::{TraversalService, TraversalServiceBuilder};
pub use connection::{ConnectionManager, LinkStatus};
pub use dispatcher::{DispatchOutcome, FrameHandler, MessageDispatcher};
