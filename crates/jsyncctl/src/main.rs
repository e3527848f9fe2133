// # jsyncctl - Junos Configuration Sync Runner
//
// Thin integration layer over jsync-core: it reads configuration from the
// environment, builds a connector through the registry, runs one operation
// and prints the result as JSON. All sync logic lives in jsync-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Device
// - `JSYNC_DEVICE_TYPE`: Connector type (memory, file)
// - `JSYNC_DEVICE_PATH`: Path to the device file (for file)
// - `JSYNC_LOCK_TIMEOUT_SECS`: Maximum wait for the configuration lock
//
// ### Operation
// - `JSYNC_RESOURCE`: Resource kind (interface-physical, utm-policy)
// - `JSYNC_OPERATION`: create, read, update, delete, import
// - `JSYNC_RESOURCE_FILE`: JSON options (for create and update)
// - `JSYNC_RESOURCE_NAME`: Resource name (for read, delete and import)
//
// ### Interfaces
// - `JSYNC_INTERFACE_DELETE_GROUP`: Group applied to park deleted interfaces
// - `JSYNC_NO_DISABLE_ON_DESTROY`: Leave deleted interfaces unparked (true/false)
//
// ## Example
//
// ```bash
// export JSYNC_DEVICE_TYPE=file
// export JSYNC_DEVICE_PATH=/var/lib/jsync/lab1.json
// export JSYNC_RESOURCE=interface-physical
// export JSYNC_OPERATION=create
// export JSYNC_RESOURCE_FILE=ae1.json
//
// jsyncctl
// ```

use anyhow::Result;
use jsync_core::{
    ConnectorRegistry, DeviceConfig, EngineConfig, InterfaceConfig, InterfacePhysicalOptions,
    ResourceOptions, SyncConfig, SyncEngine, UtmPolicyOptions,
};
use serde_json::Value;
use std::env;
use std::process::ExitCode;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Operation completed
/// - 1: Configuration or startup error
/// - 2: Operation failed
#[derive(Debug, Clone, Copy)]
enum JsyncExitCode {
    /// Operation completed
    Success = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Operation failed
    RuntimeError = 2,
}

impl From<JsyncExitCode> for ExitCode {
    fn from(code: JsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Resource kinds selectable from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resource {
    InterfacePhysical,
    UtmPolicy,
}

/// Operations selectable from the environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl Action {
    fn needs_options(&self) -> bool {
        matches!(self, Action::Create | Action::Update)
    }
}

/// Application configuration
struct Config {
    device_type: String,
    device_path: Option<String>,
    lock_timeout_secs: Option<u64>,
    resource: String,
    operation: String,
    resource_file: Option<String>,
    resource_name: Option<String>,
    delete_group: Option<String>,
    no_disable_on_destroy: bool,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let lock_timeout_secs = match env::var("JSYNC_LOCK_TIMEOUT_SECS") {
            Ok(s) => Some(s.trim().parse().map_err(|e| {
                anyhow::anyhow!("JSYNC_LOCK_TIMEOUT_SECS '{}' is not a number: {}", s, e)
            })?),
            Err(_) => None,
        };

        Ok(Self {
            device_type: env::var("JSYNC_DEVICE_TYPE").unwrap_or_else(|_| "file".to_string()),
            device_path: env::var("JSYNC_DEVICE_PATH").ok(),
            lock_timeout_secs,
            resource: env::var("JSYNC_RESOURCE")?,
            operation: env::var("JSYNC_OPERATION").unwrap_or_else(|_| "read".to_string()),
            resource_file: env::var("JSYNC_RESOURCE_FILE").ok(),
            resource_name: env::var("JSYNC_RESOURCE_NAME").ok(),
            delete_group: env::var("JSYNC_INTERFACE_DELETE_GROUP")
                .ok()
                .filter(|g| !g.is_empty()),
            no_disable_on_destroy: env::var("JSYNC_NO_DISABLE_ON_DESTROY")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            log_level: env::var("JSYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        match self.device_type.as_str() {
            "memory" => {}
            "file" => match self.device_path.as_deref() {
                None | Some("") => anyhow::bail!(
                    "JSYNC_DEVICE_PATH is required when JSYNC_DEVICE_TYPE=file. \
                    Set it via: export JSYNC_DEVICE_PATH=/var/lib/jsync/device.json"
                ),
                Some(path) => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "JSYNC_DEVICE_PATH parent directory does not exist: {}",
                            parent.display()
                        );
                    }
                }
            },
            other => anyhow::bail!(
                "JSYNC_DEVICE_TYPE '{}' is not supported. Supported types: memory, file",
                other
            ),
        }

        if let Some(timeout) = self.lock_timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            anyhow::bail!(
                "JSYNC_LOCK_TIMEOUT_SECS must be between 1 and 3600 seconds. Got: {}",
                timeout
            );
        }

        self.resource()?;
        let action = self.action()?;

        if action.needs_options() {
            match self.resource_file.as_deref() {
                None | Some("") => anyhow::bail!(
                    "JSYNC_RESOURCE_FILE is required for JSYNC_OPERATION={}",
                    self.operation
                ),
                Some(path) if !std::path::Path::new(path).is_file() => {
                    anyhow::bail!("JSYNC_RESOURCE_FILE does not exist: {}", path)
                }
                Some(_) => {}
            }
        } else if self.resource_name.as_deref().is_none_or(str::is_empty) {
            anyhow::bail!(
                "JSYNC_RESOURCE_NAME is required for JSYNC_OPERATION={}",
                self.operation
            );
        }

        if let Some(group) = &self.delete_group
            && group.chars().any(char::is_whitespace)
        {
            anyhow::bail!(
                "JSYNC_INTERFACE_DELETE_GROUP cannot contain whitespace. Got: '{}'",
                group
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "JSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn resource(&self) -> Result<Resource> {
        match self.resource.as_str() {
            "interface-physical" => Ok(Resource::InterfacePhysical),
            "utm-policy" => Ok(Resource::UtmPolicy),
            other => anyhow::bail!(
                "JSYNC_RESOURCE '{}' is not supported. \
                Supported resources: interface-physical, utm-policy",
                other
            ),
        }
    }

    fn action(&self) -> Result<Action> {
        match self.operation.as_str() {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "import" => Ok(Action::Import),
            other => anyhow::bail!(
                "JSYNC_OPERATION '{}' is not supported. \
                Supported operations: create, read, update, delete, import",
                other
            ),
        }
    }

    /// Core configuration for the engine
    fn sync_config(&self) -> SyncConfig {
        let lock_timeout_secs = self.lock_timeout_secs.unwrap_or(30);
        let device = match self.device_type.as_str() {
            "memory" => DeviceConfig::Memory {
                name: "memory0".to_string(),
                inventory: Vec::new(),
                configuration: Vec::new(),
                lock_timeout_secs,
            },
            _ => DeviceConfig::File {
                path: self.device_path.clone().unwrap_or_default(),
                lock_timeout_secs,
            },
        };

        SyncConfig {
            device,
            interface: InterfaceConfig {
                deletion_group: self.delete_group.clone(),
                no_disable_on_destroy: self.no_disable_on_destroy,
            },
            engine: EngineConfig::default(),
        }
    }

    fn name(&self) -> &str {
        self.resource_name.as_deref().unwrap_or_default()
    }

    /// Desired options from `JSYNC_RESOURCE_FILE`
    fn load_options<R: ResourceOptions>(&self) -> Result<R> {
        let path = self.resource_file.as_deref().unwrap_or_default();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid options in {}: {}", path, e))
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return JsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return JsyncExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // logs go to stderr, stdout carries the JSON result
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return JsyncExitCode::ConfigError.into();
    }

    info!(
        "jsyncctl {} {} on {} device",
        config.operation, config.resource, config.device_type
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return JsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run(config).await {
            error!("Operation failed: {}", e);
            JsyncExitCode::RuntimeError
        } else {
            JsyncExitCode::Success
        }
    });

    result.into()
}

/// Run the configured operation and print its result
async fn run(config: Config) -> Result<()> {
    let registry = ConnectorRegistry::with_builtins();
    let (engine, events) = SyncEngine::from_registry(&registry, &config.sync_config())?;
    info!("Using {} connector", engine.connector_name());

    let output = match config.resource()? {
        Resource::InterfacePhysical => run_interface_physical(&engine, &config).await,
        Resource::UtmPolicy => run_utm_policy(&engine, &config).await,
    };

    // the stream ends once the engine's sender is gone
    drop(engine);
    let mut events = ReceiverStream::new(events);
    while let Some(event) = events.next().await {
        debug!("Engine event: {:?}", event);
    }

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}

async fn run_interface_physical(engine: &SyncEngine, config: &Config) -> Result<Value> {
    let output = match config.action()? {
        Action::Create => {
            let desired: InterfacePhysicalOptions = config.load_options()?;
            serde_json::to_value(engine.create_interface_physical(&desired).await?)?
        }
        Action::Read => serde_json::to_value(engine.read_interface_physical(config.name()).await?)?,
        Action::Update => {
            let desired: InterfacePhysicalOptions = config.load_options()?;
            serde_json::to_value(engine.update_interface_physical(&desired).await?)?
        }
        Action::Delete => {
            serde_json::to_value(engine.delete_interface_physical(config.name()).await?)?
        }
        Action::Import => {
            serde_json::to_value(engine.import_interface_physical(config.name()).await?)?
        }
    };
    Ok(output)
}

async fn run_utm_policy(engine: &SyncEngine, config: &Config) -> Result<Value> {
    let output = match config.action()? {
        Action::Create => {
            let desired: UtmPolicyOptions = config.load_options()?;
            serde_json::to_value(engine.create_utm_policy(&desired).await?)?
        }
        Action::Read => serde_json::to_value(engine.read_utm_policy(config.name()).await?)?,
        Action::Update => {
            let desired: UtmPolicyOptions = config.load_options()?;
            serde_json::to_value(engine.update_utm_policy(&desired).await?)?
        }
        Action::Delete => serde_json::to_value(engine.delete_utm_policy(config.name()).await?)?,
        Action::Import => serde_json::to_value(engine.import_utm_policy(config.name()).await?)?,
    };
    Ok(output)
}
