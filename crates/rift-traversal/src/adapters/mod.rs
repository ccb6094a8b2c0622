//! # Adapters
//!
//! Implementations of the outbound transport port:
//! - `WebSocketTransport` for real worlds
//! - `InMemoryTransport` plus `ScriptedWorld` for tests and demos

pub mod memory;
pub mod websocket;

pub use memory::{HandoffBehaviour, InMemoryTransport, ScriptedWorld, WorldListener, WorldScript, WorldSession};
pub use websocket::WebSocketTransport;
