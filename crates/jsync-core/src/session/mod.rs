// # Emulated Devices
//
// This module provides implementations of the DeviceConnector trait that
// emulate a Junos configuration database in-process.

pub mod file;
pub mod memory;

pub use file::{FileDevice, FileDeviceFactory};
pub use memory::{CommitRecord, DeviceSnapshot, MemoryDevice, MemoryDeviceFactory, MemorySession};
