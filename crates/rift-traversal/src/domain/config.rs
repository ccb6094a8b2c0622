//! # Traversal Configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a
//! valid configuration.

use crate::domain::errors::ConfigError;
use crate::domain::identity::decode_public_key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Who the agent is.
    pub agent: AgentConfig,
    /// Address used when `connect` is called without one.
    pub default_world: String,
    /// Connection behaviour.
    pub connection: ConnectionConfig,
    /// How long to wait for `handoff_confirm`.
    pub handoff_timeout_ms: u64,
    /// How long to wait for `discover_response`.
    pub discovery_timeout_ms: u64,
    /// Log transition prose on `enter`.
    pub narrate_transitions: bool,
    /// Signing and verification.
    pub security: SecurityConfig,
    /// Default log filter for the agent binary.
    pub log_level: String,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            default_world: "ws://127.0.0.1:8765".to_string(),
            connection: ConnectionConfig::default(),
            handoff_timeout_ms: 60_000,
            discovery_timeout_ms: 60_000,
            narrate_transitions: true,
            security: SecurityConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

/// Agent identity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Fixed agent id. Generated at startup when absent.
    pub agent_id: Option<String>,
    /// Display name.
    pub agent_name: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            agent_name: "RiftWalker".to_string(),
        }
    }
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Deadline per attempt, covering transport open and welcome.
    pub connect_timeout_ms: u64,
    /// Attempts before giving up.
    pub max_retries: u32,
    /// Pause between failed attempts.
    pub retry_backoff_ms: u64,
    /// How long disconnect waits for the receive loop to stop.
    pub shutdown_grace_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            max_retries: 3,
            retry_backoff_ms: 1_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl ConnectionConfig {
    /// Per-attempt deadline.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Pause between attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Receive-loop shutdown grace.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Signing and verification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Refuse unsigned passports and unverifiable confirmations.
    pub require_signatures: bool,
    /// Base64 seed file. Ephemeral key when absent.
    pub key_path: Option<PathBuf>,
    /// World id to base64 public key. Pinned keys win over keys a world
    /// sends about itself.
    pub trusted_world_keys: HashMap<String, String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            require_signatures: true,
            key_path: None,
            trusted_world_keys: HashMap::new(),
        }
    }
}

impl TraversalConfig {
    /// Handoff confirmation timeout.
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    /// Discovery timeout.
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.agent_name.trim().is_empty() {
            return Err(invalid("agent.agent_name", "must not be empty"));
        }
        if self.connection.max_retries == 0 {
            return Err(invalid("connection.max_retries", "must be at least 1"));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(invalid("connection.connect_timeout_ms", "must be positive"));
        }
        if self.handoff_timeout_ms == 0 {
            return Err(invalid("handoff_timeout_ms", "must be positive"));
        }
        if self.discovery_timeout_ms == 0 {
            return Err(invalid("discovery_timeout_ms", "must be positive"));
        }
        for (world, key) in &self.security.trusted_world_keys {
            decode_public_key(key).map_err(|e| {
                invalid("security.trusted_world_keys", format!("{world}: {e}"))
            })?;
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}
