//! # Configuration Management Module
//!
//! Villehaven reads a single TOML file with three sections:
//!
//! - [`StorageConfig`] - where the sled database lives
//! - [`EngineConfig`] - shard capacity, list bounds and concurrency knobs
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use villehaven::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Write a starter file, then load it back
//!     Config::create_default("villehaven.toml").await?;
//!     let config = Config::load("villehaven.toml").await?;
//!     println!("Shard capacity: {}", config.engine.shard_capacity);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! data_dir = "./data/villehaven"
//!
//! [engine]
//! shard_capacity = 5000
//! leaderboard_limit = 1000
//! activity_limit = 200
//! recent_activity_default = 50
//! cas_max_retries = 16
//! active_window_hours = 24
//! mirror_sorted_set = true
//!
//! [logging]
//! level = "info"
//! file = "villehaven.log"
//! ```
//!
//! Every engine field has a default, so an `[engine]` section only needs the
//! values being overridden.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

/// Tunables handed to [`crate::village::Village`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Players per shard before a new shard is opened.
    #[serde(default = "default_shard_capacity")]
    pub shard_capacity: usize,
    #[serde(default = "default_leaderboard_limit")]
    pub leaderboard_limit: usize,
    #[serde(default = "default_activity_limit")]
    pub activity_limit: usize,
    /// Page size used when callers ask for "recent" activities without a limit.
    #[serde(default = "default_recent_activity")]
    pub recent_activity_default: usize,
    /// Compare-and-swap attempts per record write before reporting a conflict.
    #[serde(default = "default_cas_retries")]
    pub cas_max_retries: u32,
    /// Window used to count a player as active.
    #[serde(default = "default_active_window")]
    pub active_window_hours: i64,
    /// Also maintain the sorted-set projection of player totals.
    #[serde(default = "default_mirror")]
    pub mirror_sorted_set: bool,
}

fn default_shard_capacity() -> usize {
    5000
}

fn default_leaderboard_limit() -> usize {
    1000
}

fn default_activity_limit() -> usize {
    200
}

fn default_recent_activity() -> usize {
    50
}

fn default_cas_retries() -> u32 {
    16
}

fn default_active_window() -> i64 {
    24
}

fn default_mirror() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shard_capacity: default_shard_capacity(),
            leaderboard_limit: default_leaderboard_limit(),
            activity_limit: default_activity_limit(),
            recent_activity_default: default_recent_activity(),
            cas_max_retries: default_cas_retries(),
            active_window_hours: default_active_window(),
            mirror_sorted_set: default_mirror(),
        }
    }
}

impl EngineConfig {
    /// Reject values that would break the engine's invariants.
    pub fn validate(&self) -> Result<()> {
        if self.shard_capacity == 0 {
            return Err(anyhow!("engine.shard_capacity must be at least 1"));
        }
        if self.leaderboard_limit == 0 || self.activity_limit == 0 {
            return Err(anyhow!("engine list limits must be at least 1"));
        }
        if self.active_window_hours <= 0 {
            return Err(anyhow!("engine.active_window_hours must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        config.engine.validate()?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig {
                data_dir: "./data/villehaven".to_string(),
            },
            engine: EngineConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("villehaven.log".to_string()),
            },
        }
    }
}
