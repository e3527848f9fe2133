//! Configuration types for the jsync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main jsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device to synchronize against
    pub device: DeviceConfig,

    /// Interface lifecycle settings
    #[serde(default)]
    pub interface: InterfaceConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Create a configuration for `device` with defaults everywhere else
    pub fn new(device: DeviceConfig) -> Self {
        Self {
            device,
            interface: InterfaceConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.device.validate()?;
        self.interface.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DeviceConfig::default())
    }
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceConfig {
    /// In-memory emulated device (not persistent)
    Memory {
        /// Device name used in logs and inventory replies
        #[serde(default = "default_device_name")]
        name: String,
        /// Physical interfaces present in the hardware inventory
        #[serde(default)]
        inventory: Vec<String>,
        /// Initial committed configuration, one `set` statement per entry
        #[serde(default)]
        configuration: Vec<String>,
        /// How long a session waits for the configuration lock
        #[serde(default = "default_lock_timeout_secs")]
        lock_timeout_secs: u64,
    },

    /// Emulated device persisted to a JSON device file
    File {
        /// Path to the device file
        path: String,
        /// How long a session waits for the configuration lock
        #[serde(default = "default_lock_timeout_secs")]
        lock_timeout_secs: u64,
    },

    /// Custom connector
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl DeviceConfig {
    /// Validate the device configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DeviceConfig::Memory {
                name,
                lock_timeout_secs,
                ..
            } => {
                if name.is_empty() {
                    return Err(crate::Error::config("Memory device name cannot be empty"));
                }
                if *lock_timeout_secs == 0 {
                    return Err(crate::Error::config("Device lock timeout must be > 0"));
                }
                Ok(())
            }
            DeviceConfig::File {
                path,
                lock_timeout_secs,
            } => {
                if path.is_empty() {
                    return Err(crate::Error::config("Device file path cannot be empty"));
                }
                if *lock_timeout_secs == 0 {
                    return Err(crate::Error::config("Device lock timeout must be > 0"));
                }
                Ok(())
            }
            DeviceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom device factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom device config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the connector type name
    pub fn type_name(&self) -> &str {
        match self {
            DeviceConfig::Memory { .. } => "memory",
            DeviceConfig::File { .. } => "file",
            DeviceConfig::Custom { factory, .. } => factory,
        }
    }

    /// Lock wait of emulated devices
    pub fn lock_timeout(&self) -> Duration {
        match self {
            DeviceConfig::Memory {
                lock_timeout_secs, ..
            }
            | DeviceConfig::File {
                lock_timeout_secs, ..
            } => Duration::from_secs(*lock_timeout_secs),
            DeviceConfig::Custom { .. } => Duration::from_secs(default_lock_timeout_secs()),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig::Memory {
            name: default_device_name(),
            inventory: Vec::new(),
            configuration: Vec::new(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

/// Interface lifecycle configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Configuration group applied to park deleted interfaces
    ///
    /// When unset, deleted interfaces are parked with `disable` and
    /// `description NC` instead.
    #[serde(default)]
    pub deletion_group: Option<String>,

    /// Leave deleted interfaces unparked
    #[serde(default)]
    pub no_disable_on_destroy: bool,
}

impl InterfaceConfig {
    /// Validate the interface configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let Some(group) = &self.deletion_group {
            if group.chars().any(char::is_whitespace) {
                return Err(crate::Error::config(format!(
                    "Deletion group '{}' cannot contain whitespace",
                    group
                )));
            }
        }
        Ok(())
    }

    /// The deletion group, if set and non-empty
    pub fn deletion_group(&self) -> Option<&str> {
        self.deletion_group.as_deref().filter(|g| !g.is_empty())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the internal event channel
    ///
    /// When full, new events will be dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_device_name() -> String {
    "memory0".to_string()
}

fn default_lock_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"device": {"type": "file", "path": "/tmp/dev.json"}}"#)
                .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.device.type_name(), "file");
        assert_eq!(config.device.lock_timeout(), Duration::from_secs(30));
        assert_eq!(config.engine.event_channel_capacity, 1000);
        assert!(config.interface.deletion_group().is_none());
        assert!(!config.interface.no_disable_on_destroy);
    }

    #[test]
    fn test_validation_errors() {
        let custom = DeviceConfig::Custom {
            factory: "netconf".to_string(),
            config: serde_json::Value::Null,
        };
        assert!(custom.validate().is_err());

        let file = DeviceConfig::File {
            path: String::new(),
            lock_timeout_secs: 5,
        };
        assert!(file.validate().is_err());

        let mut config = SyncConfig::default();
        config.engine.event_channel_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.interface.deletion_group = Some("bad group".to_string());
        assert!(config.validate().is_err());
    }
}
