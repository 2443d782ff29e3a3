//! Responder configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::{CONTAINER_HEADER_SIZE, DEFAULT_BUFFER_SIZE};

/// Strings the device reports about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub model: String,
    pub device_version: String,
    pub serial_number: String,
    /// Factory default of the FriendlyName device property.
    pub friendly_name: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            manufacturer: "Rockbox.org".to_string(),
            model: "Rockbox media player".to_string(),
            device_version: "svn".to_string(),
            serial_number: "0".repeat(41),
            friendly_name: "Rockbox media player".to_string(),
        }
    }
}

/// Strings reported in the StorageInfo dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub description: String,
    pub volume_identifier: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            description: "Storage description missing".to_string(),
            volume_identifier: "Volume identifier missing".to_string(),
        }
    }
}

/// Configuration for an MTP responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    pub identity: DeviceIdentity,
    pub storage: StorageConfig,
    /// Size of each staging buffer (receive and send).
    pub buffer_size: usize,
    /// Answer GetObjectInfo from the index instead of reporting busy.
    pub object_info_enabled: bool,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::default(),
            storage: StorageConfig::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            object_info_enabled: false,
        }
    }
}

impl ResponderConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ResponderConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        // A response with five parameters must fit.
        let minimum = CONTAINER_HEADER_SIZE + 4 * 5;
        if self.buffer_size < minimum {
            anyhow::bail!(
                "buffer_size {} is below the minimum of {} bytes",
                self.buffer_size,
                minimum
            );
        }
        Ok(())
    }
}
