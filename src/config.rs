//! Configuration management for the TrinityChain light client

use crate::dispatcher::EvictionPolicy;
use crate::error::{ClientError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Peer that receives broadcasts and answers Merkle path requests.
    #[serde(default = "default_bootstrap_peer")]
    pub bootstrap_peer: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bootstrap_peer: default_bootstrap_peer(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Lets the contract creation route generate a key pair and return the
    /// private key in its response. Meant for demos and tests only.
    #[serde(default)]
    pub allow_key_generation: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            allow_key_generation: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

fn default_bootstrap_peer() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_api_port() -> u16 {
    8010
}

/// Loads `config.toml` from the working directory.
pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

/// Loads a config file, falling back to defaults when it does not exist.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config = if path.exists() {
        parse_config(&fs::read_to_string(path)?)?
    } else {
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<Config> {
    let config: Config = toml::from_str(config_str)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.network.bootstrap_peer.trim().is_empty() {
        return Err(ClientError::ConfigError(
            "network.bootstrap_peer must be set".to_string(),
        ));
    }
    if config.network.timeout_secs == 0 {
        return Err(ClientError::ConfigError(
            "network.timeout_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
