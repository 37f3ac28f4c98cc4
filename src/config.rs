//! Configuration for the heart-rate monitor agent.

use crate::channel::state::WILDCARD;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default proximity search bin.
pub const DEFAULT_PROXIMITY_BIN: u8 = 7;

/// Default event buffering threshold (0 = buffering disabled).
pub const DEFAULT_BUFFER_THRESHOLD: u16 = 0;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Pairing and radio settings
    pub sensor: SensorSettings,

    /// Path for exporting session records
    pub export_path: PathBuf,

    /// Path for storing state
    pub data_path: PathBuf,

    /// Default tracing filter (overridden by `RUST_LOG`)
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hrmon-agent");

        Self {
            sensor: SensorSettings::default(),
            export_path: data_dir.join("sessions"),
            data_path: data_dir,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults when
    /// the file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hrmon-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// The three persisted sensor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSettings {
    /// Paired device number ([`WILDCARD`] pairs with any sensor)
    pub device_number: u16,
    /// Proximity search bin used while pairing with a wildcard
    pub proximity_bin: u8,
    /// Event buffering threshold
    pub buffer_threshold: u16,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            device_number: WILDCARD,
            proximity_bin: DEFAULT_PROXIMITY_BIN,
            buffer_threshold: DEFAULT_BUFFER_THRESHOLD,
        }
    }
}

impl SensorSettings {
    /// Forget the paired device and restore defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_paired(&self) -> bool {
        self.device_number != WILDCARD
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
