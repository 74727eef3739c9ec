//! Configuration management for Roast Sync
//!
//! Handles loading, parsing, and validating the YAML configuration file.
//! Every key has a default, so an empty file (or no file) is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

use crate::channel::{ChannelBounds, ChannelId};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Interval between device polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Extra attempts for a failed channel write before it is dropped
    #[serde(default)]
    pub command_retry_count: u32,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Reconnection backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

/// Per-channel bounds. Defaults match the Aillio R1 V2 panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_heater_bounds")]
    pub heater: ChannelBounds,
    #[serde(default = "default_fan_bounds")]
    pub fan: ChannelBounds,
    #[serde(default = "default_drum_bounds")]
    pub drum: ChannelBounds,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            command_retry_count: 0,
            reconnect: ReconnectConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            heater: default_heater_bounds(),
            fan: default_fan_bounds(),
            drum: default_drum_bounds(),
        }
    }
}

impl ChannelsConfig {
    /// Bounds for one channel
    pub fn get(&self, channel: ChannelId) -> ChannelBounds {
        match channel {
            ChannelId::Heater => self.heater,
            ChannelId::Fan => self.fan,
            ChannelId::Drum => self.drum,
        }
    }
}

impl ReconnectConfig {
    /// Linear backoff capped at `max_delay_ms`
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let delay = self
            .initial_delay_ms
            .saturating_mul(attempt as u64)
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

impl SyncConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            let config = Self::load(path).await?;
            info!("Configuration loaded from {}", path.display());
            Ok(config)
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to a map
        let config: SyncConfig = if contents.trim().is_empty() {
            SyncConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }

        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            anyhow::bail!(
                "reconnect.initial_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.initial_delay_ms,
                self.reconnect.max_delay_ms
            );
        }

        for channel in ChannelId::ALL {
            let bounds = self.channels.get(channel);
            if bounds.min > bounds.max {
                anyhow::bail!(
                    "channels.{}: min ({}) must not exceed max ({})",
                    channel,
                    bounds.min,
                    bounds.max
                );
            }
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// Default value functions
fn default_poll_interval_ms() -> u64 { 100 }
fn default_initial_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 30_000 }
fn default_heater_bounds() -> ChannelBounds { ChannelBounds { min: 0, max: 9 } }
fn default_fan_bounds() -> ChannelBounds { ChannelBounds { min: 1, max: 12 } }
fn default_drum_bounds() -> ChannelBounds { ChannelBounds { min: 1, max: 9 } }
