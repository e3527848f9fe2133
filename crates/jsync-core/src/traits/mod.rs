//! Core traits for the jsync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DeviceSession`]: Query, stage and commit configuration on a device
//! - [`DeviceConnector`]: Open sessions to a device
//! - [`DeviceConnectorFactory`]: Build connectors from configuration

pub mod device_session;

pub use device_session::{DeviceConnector, DeviceConnectorFactory, DeviceSession};
