//! # Integration Tests
//!
//! Multi-world scenarios. Each agent talks to in-process scripted worlds
//! or to a throwaway WebSocket server on a loopback port.

pub mod connection_flow;
pub mod security_flow;
pub mod traversal_flow;

use rift_traversal::TraversalConfig;

/// Lobby world address on the in-memory transport.
pub const LOBBY: &str = "mem://molt.space";
/// Destination world address on the in-memory transport.
pub const GRID: &str = "mem://cyber.grid";
/// Second destination.
pub const VOID: &str = "mem://void.null";

/// Tight timeouts so failure scenarios finish quickly.
pub fn test_config() -> TraversalConfig {
    let mut config = TraversalConfig::default();
    config.default_world = LOBBY.to_string();
    config.agent.agent_name = "Wanderer".to_string();
    config.connection.connect_timeout_ms = 500;
    config.connection.max_retries = 2;
    config.connection.retry_backoff_ms = 10;
    config.connection.shutdown_grace_ms = 200;
    config.handoff_timeout_ms = 400;
    config.discovery_timeout_ms = 250;
    config
}
