//! Configuration management for the BLE MIDI bridge
//!
//! Handles loading, validating and saving the YAML settings file. JSON is a
//! subset of YAML, so settings files written as JSON load as well.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

/// Bridge settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BridgeConfig {
    /// Device name substring to look for (case-insensitive)
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Output port name; when unset the first virtual port is used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi_port: Option<String>,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Delay between reconnect cycles
    #[serde(default = "default_scan_interval", alias = "scan_interval")]
    pub scan_interval_secs: u64,

    #[serde(default = "default_max_scan_attempts")]
    pub max_scan_attempts: u32,

    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,

    /// Pause between scan attempts within one cycle
    #[serde(default = "default_scan_retry_delay")]
    pub scan_retry_delay_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How often the link is polled while streaming
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            midi_port: None,
            auto_reconnect: true,
            scan_interval_secs: default_scan_interval(),
            max_scan_attempts: default_max_scan_attempts(),
            scan_timeout_secs: default_scan_timeout(),
            scan_retry_delay_secs: default_scan_retry_delay(),
            connect_timeout_secs: default_connect_timeout(),
            liveness_interval_ms: default_liveness_interval(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: BridgeConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            let config = Self::load(path).await?;
            info!("Configuration loaded from {}", path.display());
            Ok(config)
        } else {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.device_name.trim().is_empty() {
            anyhow::bail!("device_name cannot be empty");
        }
        if let Some(port) = &self.midi_port {
            if port.trim().is_empty() {
                anyhow::bail!("midi_port cannot be empty when set");
            }
        }
        if self.max_scan_attempts == 0 {
            anyhow::bail!("max_scan_attempts must be at least 1");
        }
        if self.scan_timeout_secs == 0 {
            anyhow::bail!("scan_timeout_secs must be at least 1");
        }
        if self.connect_timeout_secs == 0 {
            anyhow::bail!("connect_timeout_secs must be at least 1");
        }
        if self.liveness_interval_ms == 0 {
            anyhow::bail!("liveness_interval_ms must be at least 1");
        }

        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn scan_retry_delay(&self) -> Duration {
        Duration::from_secs(self.scan_retry_delay_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms)
    }
}

// Default value functions
fn default_device_name() -> String { "FP-18".to_string() }
fn default_true() -> bool { true }
fn default_scan_interval() -> u64 { 5 }
fn default_max_scan_attempts() -> u32 { 3 }
fn default_scan_timeout() -> u64 { 10 }
fn default_scan_retry_delay() -> u64 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_liveness_interval() -> u64 { 1000 }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: BridgeConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.device_name, "FP-18");
        assert!(config.auto_reconnect);
        assert_eq!(config.scan_interval(), Duration::from_secs(5));
        assert_eq!(config.max_scan_attempts, 3);
        assert_eq!(config.scan_timeout(), Duration::from_secs(10));
        assert_eq!(config.liveness_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_legacy_json_keys() {
        let json = r#"{
            "device_name": "Roland FP-18",
            "midi_port": "loopMIDI ToSeeMusic",
            "auto_reconnect": false,
            "scan_interval": 15
        }"#;

        let config: BridgeConfig = serde_yaml::from_str(json).unwrap();

        assert_eq!(config.device_name, "Roland FP-18");
        assert_eq!(config.midi_port.as_deref(), Some("loopMIDI ToSeeMusic"));
        assert!(!config.auto_reconnect);
        assert_eq!(config.scan_interval_secs, 15);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BridgeConfig::default();
        assert!(config.validate().is_ok());

        config.device_name = "  ".to_string();
        assert!(config.validate().is_err());

        let config = BridgeConfig {
            max_scan_attempts: 0,
            ..BridgeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BridgeConfig {
            midi_port: Some(String::new()),
            ..BridgeConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BridgeConfig {
            liveness_interval_ms: 0,
            ..BridgeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_then_load() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("nested").join("config.yaml");

        let config = BridgeConfig {
            device_name: "Digital Piano".to_string(),
            midi_port: Some("IAC Driver Bus 1".to_string()),
            max_scan_attempts: 5,
            ..BridgeConfig::default()
        };
        config.save(&path).await?;

        let loaded = BridgeConfig::load(&path).await?;
        assert_eq!(loaded, config);

        Ok(())
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "device_name: \"\"\n")?;

        assert!(BridgeConfig::load(&path).await.is_err());

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("absent.yaml");

        let config = BridgeConfig::load_or_default(&path).await?;
        assert_eq!(config, BridgeConfig::default());

        Ok(())
    }
}
