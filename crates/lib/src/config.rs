//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.pigeon/config.json`) and
//! environment. Kept minimal: the only thing the client needs to find is
//! the backend's bridge endpoint.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend bridge endpoint settings.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

/// Where the backend process serves the bridge WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Host the backend binds (default "127.0.0.1").
    #[serde(default = "default_bridge_host")]
    pub host: String,

    /// Port for the bridge WebSocket (default 8000).
    #[serde(default = "default_bridge_port")]
    pub port: u16,
}

fn default_bridge_host() -> String {
    "127.0.0.1".to_string()
}

fn default_bridge_port() -> u16 {
    8000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_bridge_host(),
            port: default_bridge_port(),
        }
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PIGEON_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".pigeon").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Resolve the bridge port: env PIGEON_BRIDGE_PORT overrides config.
pub fn resolve_bridge_port(config: &Config) -> u16 {
    std::env::var("PIGEON_BRIDGE_PORT")
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(config.bridge.port)
}

/// Load config from the default path (or PIGEON_CONFIG_PATH). Missing file
/// => default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
