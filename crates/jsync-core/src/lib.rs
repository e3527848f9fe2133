// # jsync-core
//
// Core library for declarative Junos configuration sync.
//
// ## Architecture Overview
//
// This library keeps the line-oriented configuration of a Junos device in
// sync with structured resource options:
// - **statement**: `set`/`delete` statements and dump normalization
// - **resources**: Structured options and their statement codecs
// - **lifecycle**: Interface lifecycle classification (parked, empty, present)
// - **aggregate**: Aggregated-interface device-count allocation
// - **SyncEngine**: Lock → apply → commit → verify transactions
// - **DeviceSession**: Trait for device access (emulated devices included)
// - **ConnectorRegistry**: Plugin-based registry for device connectors
//
// ## Design Principles
//
// 1. **Device as source of truth**: Every operation starts from a fresh read
// 2. **Text in, text out**: Pure codecs, all I/O behind `DeviceSession`
// 3. **Plugin-Based**: Connectors are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: An update that changes nothing commits nothing

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod resources;
pub mod session;
pub mod statement;
pub mod traits;

// Re-export core types for convenience
pub use config::{DeviceConfig, EngineConfig, InterfaceConfig, SyncConfig};
pub use engine::{EngineEvent, Operation, SyncEngine, SyncOutcome};
pub use error::{Error, ErrorKind, Result};
pub use lifecycle::InterfaceLifecycleState;
pub use registry::ConnectorRegistry;
pub use resources::{InterfacePhysicalOptions, ResourceOptions, UtmPolicyOptions};
pub use session::{FileDevice, MemoryDevice};
pub use statement::{ConfigLine, ConfigStatement};
pub use traits::{DeviceConnector, DeviceSession};
