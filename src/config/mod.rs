//! Configuration management for MSU Link
//!
//! Handles loading, parsing, and validation of the YAML configuration file.
//! A missing file yields the defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    /// MSU type catalog, relative paths resolve against the config directory
    #[serde(default = "default_msu_types")]
    pub msu_types: PathBuf,
    /// Overrides the well-known discovery record location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_file: Option<PathBuf>,
    #[serde(default)]
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    /// Tracing filter directive used when `RUST_LOG` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Notification receiver configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReceiverConfig {
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

/// Notification sender configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SenderConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            msu_types: default_msu_types(),
            discovery_file: None,
            receiver: ReceiverConfig::default(),
            sender: SenderConfig::default(),
            log_level: None,
        }
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl ReceiverConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl SenderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            return Self::load(path).await;
        }

        info!("No config at {}, using defaults", path.display());
        let mut config = Self::default();
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.msu_types.as_os_str().is_empty() {
            anyhow::bail!("msu_types cannot be empty");
        }
        if let Some(discovery_file) = &self.discovery_file {
            if discovery_file.as_os_str().is_empty() {
                anyhow::bail!("discovery_file cannot be empty when set");
            }
        }

        if self.receiver.shutdown_timeout_ms == 0 {
            anyhow::bail!("receiver.shutdown_timeout_ms must be greater than 0");
        }
        if self.sender.request_timeout_ms == 0 {
            anyhow::bail!("sender.request_timeout_ms must be greater than 0");
        }

        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if self.msu_types.is_relative() {
            self.msu_types = base.join(&self.msu_types);
        }
        if let Some(discovery_file) = self.discovery_file.as_mut() {
            if discovery_file.is_relative() {
                *discovery_file = base.join(&*discovery_file);
            }
        }
    }
}

// Default value functions
fn default_msu_types() -> PathBuf { PathBuf::from("msu_types.yaml") }
fn default_shutdown_timeout() -> u64 { 3000 }
fn default_request_timeout() -> u64 { 2000 }
