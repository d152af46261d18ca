//! Agent configuration management.
//!
//! Configuration is stored as TOML at `~/.config/photovault/agent.toml`.

use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use photovault_transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_QUEUE_CAPACITY, FlushPolicy};

/// Agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial device exposed by the Bluetooth stack for the phone link.
    #[serde(default = "default_device")]
    pub device: String,

    /// Storage mount point that backed-up files land under.
    #[serde(default = "default_mount_point")]
    pub mount_point: String,

    /// Device serial number keying the backup log (hostname by default).
    #[serde(default = "default_serial_number")]
    pub serial_number: String,

    /// Byte capacity of the inbound queue.
    #[serde(default = "default_queue_capacity")]
    pub inbound_capacity: usize,

    /// Byte capacity of the outbound queue.
    #[serde(default = "default_queue_capacity")]
    pub outbound_capacity: usize,

    /// Read size for outbound file streaming.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// How the receiver persists inbound chunks.
    #[serde(default)]
    pub flush_policy: FlushPolicy,
}

fn default_device() -> String {
    "/dev/rfcomm0".into()
}

fn default_mount_point() -> String {
    "/mnt/photovault".into()
}

fn default_serial_number() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "photovault".into())
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: default_device(),
            mount_point: default_mount_point(),
            serial_number: default_serial_number(),
            inbound_capacity: default_queue_capacity(),
            outbound_capacity: default_queue_capacity(),
            chunk_size: default_chunk_size(),
            flush_policy: FlushPolicy::default(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("photovault")
        .join("agent.toml"))
}
