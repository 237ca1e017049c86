//! Configuration management for the hub.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use medlink_common::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_LISTEN_ADDR, DEFAULT_MAX_FRAME_BYTES,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP/WebSocket listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// This hub's identifier in logs and stats (auto-generated if not set)
    #[serde(default = "generate_node_id")]
    pub node_id: String,

    /// Allowed browser origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Per-connection transport settings
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Transport-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Outbound frames buffered per peer before new ones are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Largest inbound text frame accepted, in bytes
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_channel_capacity() -> usize { DEFAULT_CHANNEL_CAPACITY }
fn default_max_frame_bytes() -> usize { DEFAULT_MAX_FRAME_BYTES }

fn generate_node_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    format!("hub-{:08x}", rng.random::<u32>())
}

impl AppConfig {
    /// Load configuration from file, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut config = Self::from_file(config_path)?;

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(config_path: &str) -> Result<Self> {
        Self::from_sources(config_path, None)
    }

    /// File (optional) overlaid with `MEDLINK_*` variables. `env` replaces
    /// the process environment when set.
    fn from_sources(config_path: &str, env: Option<config::Map<String, String>>) -> Result<Self> {
        if !Path::new(config_path).exists() {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }

        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("MEDLINK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .context("Failed to load config")?;

        settings
            .try_deserialize()
            .context("Failed to parse config")
    }

    fn validate(&self) -> Result<()> {
        if self.transport.channel_capacity == 0 {
            anyhow::bail!("transport.channel_capacity must be at least 1");
        }
        if self.transport.max_frame_bytes == 0 {
            anyhow::bail!("transport.max_frame_bytes must be at least 1");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            node_id: generate_node_id(),
            cors_origins: Vec::new(),
            transport: TransportConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
        assert!(config.node_id.starts_with("hub-"));
        assert_eq!(config.transport.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = assert_ok!(AppConfig::from_sources("does/not/exist.toml", env(&[])));
        assert!(config.cors_origins.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = std::env::temp_dir().join(format!("medlink-test-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "listen_addr = \"0.0.0.0:7000\"\n\n[transport]\nchannel_capacity = 8"
        )
        .unwrap();

        let config = AppConfig::from_sources(path.to_str().unwrap(), env(&[])).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.listen_addr, "0.0.0.0:7000");
        assert_eq!(config.transport.channel_capacity, 8);
        assert_eq!(config.transport.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    fn env(vars: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_env_overrides_without_file() {
        let config = assert_ok!(AppConfig::from_sources(
            "does/not/exist.toml",
            env(&[
                ("MEDLINK_TRANSPORT__CHANNEL_CAPACITY", "7"),
                ("MEDLINK_LISTEN_ADDR", "0.0.0.0:9000"),
            ]),
        ));
        assert_eq!(config.transport.channel_capacity, 7);
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.transport.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn test_env_overrides_file() {
        let path = std::env::temp_dir().join(format!("medlink-env-{}.toml", std::process::id()));
        std::fs::write(&path, "[transport]\nchannel_capacity = 8\nmax_frame_bytes = 1024\n").unwrap();

        let config = AppConfig::from_sources(
            path.to_str().unwrap(),
            env(&[("MEDLINK_TRANSPORT__CHANNEL_CAPACITY", "9")]),
        );
        std::fs::remove_file(&path).ok();

        let config = assert_ok!(config);
        assert_eq!(config.transport.channel_capacity, 9);
        assert_eq!(config.transport.max_frame_bytes, 1024);
    }

    #[test]
    fn test_unprefixed_env_is_ignored() {
        let config = assert_ok!(AppConfig::from_sources(
            "does/not/exist.toml",
            env(&[("TRANSPORT__CHANNEL_CAPACITY", "3")]),
        ));
        assert_eq!(config.transport.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_is_invalid() {
        let mut config = AppConfig::default();
        config.transport.channel_capacity = 0;
        assert_err!(config.validate());
    }
}
