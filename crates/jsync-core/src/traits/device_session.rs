// # Device Session Trait
//
// Defines the interface to a Junos device's configuration.
//
// ## Purpose
//
// A device session is the only way the core touches a device:
// - Running operational and `show configuration` queries
// - Staging `set`/`delete` statements in the candidate configuration
// - Locking, committing and discarding the candidate
//
// Transport, authentication and framing belong to implementations. The
// device's configuration is the sole source of truth; sessions never cache
// it on behalf of the core.
//
// ## Implementations
//
// - `MemoryDevice`: in-process emulation
// - `FileDevice`: emulation persisted to a JSON file
// - Future: NETCONF over SSH
//
// ## Usage
//
// ```rust
// use jsync_core::{ConfigStatement, DeviceConnector};
//
// async fn disable(connector: &dyn DeviceConnector) -> jsync_core::Result<()> {
//     let session = connector.connect().await?;
//     session.lock().await?;
//     session
//         .apply_statements(&[ConfigStatement::set("interfaces ge-0/0/1 disable")])
//         .await?;
//     session.commit("disable ge-0/0/1").await?;
//     session.close().await;
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::DeviceConfig;
use crate::statement::ConfigStatement;

/// Trait for device sessions
///
/// One session serves one operation: it is opened by a
/// [`DeviceConnector`], used sequentially by the engine, then closed.
///
/// # Thread Safety
///
/// Sessions are `Send + Sync` so they can be held across await points in
/// spawned tasks, but the engine never calls one concurrently.
///
/// # Locking contract
///
/// - `lock()` takes the device's exclusive configuration lock (or fails)
/// - statements applied after `lock()` are staged, not visible to queries
///   of other sessions
/// - `commit()` publishes the staged statements and releases the lock
/// - `discard_pending()` drops the staged statements and releases the lock
///
/// ## Implementation Guidelines
///
/// - **No retries**: report failures as [`Error::Transport`](crate::Error::Transport);
///   the caller decides whether to retry
/// - **Discard never fails**: log failures instead, the caller is already
///   handling a previous error
/// - **Query replies verbatim**: framing markers included, the core's
///   normalizer deals with them
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Run a command and return its raw text reply
    ///
    /// # Parameters
    ///
    /// - `command`: e.g. `show configuration interfaces ge-0/0/1 | display set relative`
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The raw reply
    /// - `Err(Error)`: Transport failure
    async fn run_query(&self, command: &str) -> Result<String, crate::Error>;

    /// Stage statements in the candidate configuration, in order
    async fn apply_statements(&self, statements: &[ConfigStatement]) -> Result<(), crate::Error>;

    /// Take the exclusive configuration lock
    async fn lock(&self) -> Result<(), crate::Error>;

    /// Commit staged statements with a log description
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<String>)`: Commit warnings (possibly empty)
    /// - `Err(Error)`: The commit was rejected; staged statements remain
    ///   until discarded
    async fn commit(&self, description: &str) -> Result<Vec<String>, crate::Error>;

    /// Drop staged statements and release the lock
    async fn discard_pending(&self);

    /// Close the session
    async fn close(&self) {}

    /// Device name (for logging/debugging)
    fn device_name(&self) -> &str;
}

/// Opens sessions to one device
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Open a new session
    async fn connect(&self) -> Result<Box<dyn DeviceSession>, crate::Error>;

    /// Connector type name (e.g. "memory", "file")
    fn connector_name(&self) -> &'static str;
}

/// Helper trait for constructing connectors from configuration
pub trait DeviceConnectorFactory: Send + Sync {
    /// Create a DeviceConnector from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Device configuration
    ///
    /// # Returns
    ///
    /// A shared DeviceConnector trait object
    fn create(&self, config: &DeviceConfig) -> Result<Arc<dyn DeviceConnector>, crate::Error>;
}
