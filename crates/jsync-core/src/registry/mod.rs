//! Plugin-based connector registry
//!
//! The registry allows device connectors to be registered dynamically at
//! runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jsync_core::registry::ConnectorRegistry;
//! use jsync_core::config::DeviceConfig;
//!
//! // Registry with the emulated devices already registered
//! let registry = ConnectorRegistry::with_builtins();
//!
//! // Register a transport
//! registry.register_connector("netconf", Box::new(netconf_factory));
//!
//! // Create connector from config
//! let config = DeviceConfig::File { path: "lab1.json".into(), lock_timeout_secs: 30 };
//! let connector = registry.create_connector(&config)?;
//! ```

use crate::config::DeviceConfig;
use crate::error::{Error, Result};
use crate::session::{FileDeviceFactory, MemoryDeviceFactory};
use crate::traits::{DeviceConnector, DeviceConnectorFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Connector registry for plugin-based device access
///
/// The registry maintains a map of connector type names to factory objects,
/// allowing dynamic instantiation of connectors based on configuration.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ConnectorRegistry {
    /// Registered connector factories
    connectors: RwLock<HashMap<String, Box<dyn DeviceConnectorFactory>>>,
}

impl ConnectorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` emulated devices
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_connector("memory", Box::new(MemoryDeviceFactory));
        registry.register_connector("file", Box::new(FileDeviceFactory));
        registry
    }

    /// Register a connector factory
    ///
    /// # Parameters
    ///
    /// - `name`: Connector type name (e.g., "memory", "netconf")
    /// - `factory`: Factory object for creating connector instances
    pub fn register_connector(
        &self,
        name: impl Into<String>,
        factory: Box<dyn DeviceConnectorFactory>,
    ) {
        let name = name.into();
        let mut connectors = self
            .connectors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        connectors.insert(name, factory);
    }

    /// Create a connector from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn DeviceConnector>)`: Created connector instance
    /// - `Err(Error)`: If the connector type is not registered or creation fails
    pub fn create_connector(&self, config: &DeviceConfig) -> Result<Arc<dyn DeviceConnector>> {
        config.validate()?;

        let connector_type = config.type_name();
        let connectors = self
            .connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = connectors.get(connector_type).ok_or_else(|| {
            Error::config(format!("Unknown device type: {}", connector_type))
        })?;

        factory.create(config)
    }

    /// List all registered connector types
    pub fn list_connectors(&self) -> Vec<String> {
        let connectors = self
            .connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        connectors.keys().cloned().collect()
    }

    /// Check if a connector type is registered
    pub fn has_connector(&self, name: &str) -> bool {
        let connectors = self
            .connectors
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        connectors.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockConnectorFactory;

    impl DeviceConnectorFactory for MockConnectorFactory {
        fn create(&self, _config: &DeviceConfig) -> Result<Arc<dyn DeviceConnector>> {
            Err(Error::not_found("Mock connector not implemented"))
        }
    }

    #[test]
    fn test_registry_registration() {
        let registry = ConnectorRegistry::new();

        // Initially empty
        assert!(!registry.has_connector("mock"));

        // Register
        registry.register_connector("mock", Box::new(MockConnectorFactory));

        // Now present
        assert!(registry.has_connector("mock"));
        assert!(registry.list_connectors().contains(&"mock".to_string()));

        let config = DeviceConfig::Custom {
            factory: "mock".to_string(),
            config: serde_json::json!({}),
        };
        assert!(registry.create_connector(&config).is_err());
    }

    #[test]
    fn test_builtins() {
        let registry = ConnectorRegistry::with_builtins();
        assert!(registry.has_connector("memory"));
        assert!(registry.has_connector("file"));

        let connector = registry.create_connector(&DeviceConfig::default()).unwrap();
        assert_eq!(connector.connector_name(), "memory");

        let unknown = DeviceConfig::Custom {
            factory: "netconf".to_string(),
            config: serde_json::json!({"host": "192.0.2.1"}),
        };
        let err = registry.create_connector(&unknown).err().unwrap();
        assert!(err.to_string().contains("Unknown device type: netconf"));
    }
}
