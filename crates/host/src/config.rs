//! Host configuration management

use anyhow::{Context, Result, anyhow};
use common::RetryPolicy;
use serde::{Deserialize, Serialize};
use session::SessionOptions;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub host: HostSettings,
    /// Open retry policy applied while discovering devices
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// Device event delivery
    #[serde(default)]
    pub events: EventSettings,
    /// libusb request settings
    #[serde(default)]
    pub transport: TransportSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSettings {
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Retries after the first failed open
    #[serde(default = "DiscoverySettings::default_retry_count")]
    pub retry_count: u32,
    /// Delay between open attempts in milliseconds
    #[serde(default = "DiscoverySettings::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            retry_count: Self::default_retry_count(),
            retry_delay_ms: Self::default_retry_delay_ms(),
        }
    }
}

impl DiscoverySettings {
    fn default_retry_count() -> u32 {
        common::retry::DEFAULT_RETRIES
    }

    fn default_retry_delay_ms() -> u64 {
        common::retry::DEFAULT_DELAY.as_millis() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSettings {
    /// Per-subscriber queue depth; events beyond it are dropped
    #[serde(default = "EventSettings::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

impl EventSettings {
    fn default_queue_capacity() -> usize {
        common::DEFAULT_QUEUE_CAPACITY
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Timeout of a single USB request in milliseconds
    #[serde(default = "TransportSettings::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl TransportSettings {
    fn default_timeout_ms() -> u64 {
        1000
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host: HostSettings {
                log_level: "info".to_string(),
            },
            discovery: DiscoverySettings::default(),
            events: EventSettings::default(),
            transport: TransportSettings::default(),
        }
    }
}

impl HostConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/webusb-host/host.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate TOML configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: HostConfig = toml::from_str(content).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("webusb-host").join("host.toml")
        } else {
            PathBuf::from(".config/webusb-host/host.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.host.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.host.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.events.queue_capacity == 0 {
            return Err(anyhow!("events.queue_capacity must be greater than 0"));
        }

        if self.transport.timeout_ms == 0 {
            return Err(anyhow!("transport.timeout_ms must be greater than 0"));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.transport.timeout_ms)
    }

    pub fn to_session_options(&self) -> SessionOptions {
        SessionOptions {
            retry: RetryPolicy::new(
                self.discovery.retry_count,
                Duration::from_millis(self.discovery.retry_delay_ms),
            ),
            queue_capacity: self.events.queue_capacity,
        }
    }
}

/// Load a configuration file, expanding a leading `~`
pub fn load_config(path: &str) -> Result<HostConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    HostConfig::load(Some(path_buf))
}
