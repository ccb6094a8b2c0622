//! Configuration loading for the agent binary.
//!
//! Precedence: environment variables, then the TOML file, then defaults.

use anyhow::{Context, Result};
use rift_traversal::TraversalConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Agent name override.
pub const ENV_AGENT_NAME: &str = "RIFT_AGENT_NAME";
/// Default world override.
pub const ENV_DEFAULT_WORLD: &str = "RIFT_DEFAULT_WORLD";
/// Signature enforcement override (`true`/`false`).
pub const ENV_REQUIRE_SIGNATURES: &str = "RIFT_REQUIRE_SIGNATURES";
/// Key file override.
pub const ENV_KEY_PATH: &str = "RIFT_KEY_PATH";
/// Log filter override.
pub const ENV_LOG_LEVEL: &str = "RIFT_LOG_LEVEL";

/// Load `path` if given, apply environment overrides, validate.
pub fn load_config(path: Option<&Path>) -> Result<TraversalConfig> {
    let mut config = match path {
        Some(path) => TraversalConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => TraversalConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Apply overrides read through `lookup`.
pub fn apply_overrides(config: &mut TraversalConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(name) = lookup(ENV_AGENT_NAME) {
        config.agent.agent_name = name;
    }
    if let Some(world) = lookup(ENV_DEFAULT_WORLD) {
        config.default_world = world;
    }
    if let Some(flag) = lookup(ENV_REQUIRE_SIGNATURES) {
        match flag.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => config.security.require_signatures = true,
            "0" | "false" | "no" => config.security.require_signatures = false,
            other => warn!("{} must be true or false, ignoring {:?}", ENV_REQUIRE_SIGNATURES, other),
        }
    }
    if let Some(path) = lookup(ENV_KEY_PATH) {
        info!("Using signing key from {}", path);
        config.security.key_path = Some(PathBuf::from(path));
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.log_level = level;
    }
}
