//! Core sync engine
//!
//! The SyncEngine is responsible for:
//! - Reading the current state of a resource from the device
//! - Planning the statements that turn it into the desired state
//! - Keeping the aggregated device count consistent
//! - Running lock → apply → commit → verify transactions
//!
//! ## Architecture
//!
//! ```text
//!   desired options
//!         │
//!         ▼
//! ┌──────────────┐   query / apply / commit   ┌─────────────────┐
//! │  SyncEngine  │───────────────────────────▶│ DeviceSession   │
//! └──────────────┘                            └─────────────────┘
//!         │
//!         ├── codec (resources)      encode / decode / plan_update
//!         ├── lifecycle              NotConfigured / Empty / Present
//!         ├── aggregate              device-count allocation
//!         └── events                 bounded channel, dropped when full
//! ```
//!
//! ## Transaction Flow
//!
//! 1. Open a session and take the configuration lock
//! 2. Read the current configuration of the resource
//! 3. Stage the planned statements (nothing is committed for an empty plan)
//! 4. Commit; any failure up to here discards the candidate
//! 5. Read back and verify the committed state
//!
//! The device is the only source of truth: every operation starts from a
//! fresh read and nothing is cached between operations.

mod interface_physical;
pub mod transaction;
mod utm_policy;

use crate::config::{InterfaceConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::registry::ConnectorRegistry;
use crate::statement::{ConfigLine, ConfigStatement, Normalizer, show_configuration_query};
use crate::traits::{DeviceConnector, DeviceSession};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tracing::{debug, warn};

pub use transaction::{CommitReceipt, Transaction, TransactionScope};

/// Serializes post-commit verification of interface operations across every
/// engine in the process
static VERIFY_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Mutating operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
    Import,
}

impl Operation {
    /// Verb used in commit descriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Import => "import",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Operation accepted
    OperationStarted {
        kind: &'static str,
        name: String,
        operation: Operation,
    },

    /// Commit accepted by the device
    Committed {
        kind: &'static str,
        name: String,
        description: String,
        statements: usize,
    },

    /// Staged statements dropped
    Discarded {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// Device already matched the desired state; nothing committed
    Unchanged { kind: &'static str, name: String },

    /// Committed state read back as expected
    Verified { kind: &'static str, name: String },

    /// Committed state read back wrong
    VerificationFailed {
        kind: &'static str,
        name: String,
        error: String,
    },
}

/// Result of a mutating operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome<R> {
    /// State read back after the operation (`None` after a delete)
    pub options: Option<R>,
    /// Statements applied, in order, across every commit
    pub statements: Vec<ConfigStatement>,
    /// Commit warnings
    pub warnings: Vec<String>,
    /// Completion time of the last commit, `None` when nothing was committed
    pub committed_at: Option<DateTime<Utc>>,
}

impl<R> SyncOutcome<R> {
    /// Outcome of an operation that committed nothing
    pub fn unchanged(options: Option<R>) -> Self {
        Self {
            options,
            statements: Vec::new(),
            warnings: Vec::new(),
            committed_at: None,
        }
    }

    /// Whether anything was committed
    pub fn is_changed(&self) -> bool {
        self.committed_at.is_some()
    }

    fn record(&mut self, receipt: CommitReceipt) {
        self.statements.extend(receipt.statements);
        self.warnings.extend(receipt.warnings);
        self.committed_at = Some(receipt.committed_at);
    }
}

/// Core sync engine
///
/// ## Threading
///
/// The engine is cheap to clone; clones share the connector and the event
/// channel. Operations may run concurrently: the device lock serializes
/// their transactions, and post-commit verification of interface operations
/// is serialized by a process-wide lock shared by every engine (the
/// aggregated device count is a configuration-wide invariant).
#[derive(Clone)]
pub struct SyncEngine {
    /// Opens device sessions
    connector: Arc<dyn DeviceConnector>,

    /// Interface lifecycle settings
    interface: InterfaceConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        connector: Arc<dyn DeviceConnector>,
        config: &SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let engine = Self {
            connector,
            interface: config.interface.clone(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Create an engine whose connector is built by `registry`
    pub fn from_registry(
        registry: &ConnectorRegistry,
        config: &SyncConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        let connector = registry.create_connector(&config.device)?;
        Self::new(connector, config)
    }

    /// Name of the connector in use
    pub fn connector_name(&self) -> &'static str {
        self.connector.connector_name()
    }

    async fn open_session(&self) -> Result<Box<dyn DeviceSession>> {
        let session = self.connector.connect().await?;
        debug!(
            "Session opened to {} via {}",
            session.device_name(),
            self.connector.connector_name()
        );
        Ok(session)
    }

    /// Enter the process-wide verification region
    async fn verification_region(&self) -> MutexGuard<'static, ()> {
        VERIFY_LOCK.lock().await
    }

    fn scope<'a>(&'a self, kind: &'static str, name: &'a str) -> TransactionScope<'a> {
        TransactionScope {
            kind,
            name,
            events: &self.event_tx,
        }
    }

    fn started(&self, kind: &'static str, name: &str, operation: Operation) {
        debug!("{} {} {}", operation, kind, name);
        self.emit_event(EngineEvent::OperationStarted {
            kind,
            name: name.to_string(),
            operation,
        });
    }

    fn verified(&self, kind: &'static str, name: &str) {
        self.emit_event(EngineEvent::Verified {
            kind,
            name: name.to_string(),
        });
    }

    /// Emit the failure event and build the error
    fn verification_failed(&self, kind: &'static str, name: &str, message: String) -> Error {
        warn!("Verification of {} {} failed: {}", kind, name, message);
        self.emit_event(EngineEvent::VerificationFailed {
            kind,
            name: name.to_string(),
            error: message.clone(),
        });
        Error::state_inconsistency(message)
    }

    fn unchanged(&self, kind: &'static str, name: &str) {
        debug!("{} {} already up to date", kind, name);
        self.emit_event(EngineEvent::Unchanged {
            kind,
            name: name.to_string(),
        });
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        emit(&self.event_tx, event);
    }
}

/// Send `event`, logging a warning if the channel is full
pub(crate) fn emit(tx: &mpsc::Sender<EngineEvent>, event: EngineEvent) {
    if tx.try_send(event).is_err() {
        warn!(
            "Event channel full, dropping event. Consider increasing event_channel_capacity."
        );
    }
}

/// `show configuration <path> | display set relative`, normalized
pub(crate) async fn fetch_lines(
    session: &dyn DeviceSession,
    path: &str,
    normalizer: &Normalizer,
) -> Result<Vec<ConfigLine>> {
    let raw = session
        .run_query(&show_configuration_query(path, true))
        .await?;
    Ok(normalizer.normalize(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_event_clone() {
        let event = EngineEvent::Committed {
            kind: "interface_physical",
            name: "ae1".to_string(),
            description: "create resource interface_physical".to_string(),
            statements: 3,
        };

        assert_eq!(event.clone(), event);
    }

    #[test]
    fn test_outcome_records_commits() {
        let mut outcome: SyncOutcome<()> = SyncOutcome::unchanged(None);
        assert!(!outcome.is_changed());

        outcome.record(CommitReceipt {
            statements: vec![ConfigStatement::delete("interfaces ge-0/0/1")],
            warnings: vec!["statement not found".to_string()],
            committed_at: Utc::now(),
        });
        outcome.record(CommitReceipt {
            statements: vec![ConfigStatement::set("interfaces ge-0/0/1 disable")],
            warnings: vec![],
            committed_at: Utc::now(),
        });

        assert!(outcome.is_changed());
        assert_eq!(outcome.statements.len(), 2);
        assert_eq!(outcome.warnings, vec!["statement not found".to_string()]);
    }

    #[tokio::test]
    async fn test_verification_region_is_shared_by_every_engine() {
        use crate::resources::InterfacePhysicalOptions;
        use crate::session::{DeviceSnapshot, MemoryDevice};
        use std::time::Duration;

        let device = MemoryDevice::from_snapshot(
            "lab1",
            DeviceSnapshot::new().with_inventory(["ge-0/0/1"]),
        );
        let (holder, _holder_events) =
            SyncEngine::new(Arc::new(device.clone()), &SyncConfig::default()).unwrap();
        let (other, _other_events) =
            SyncEngine::new(Arc::new(device.clone()), &SyncConfig::default()).unwrap();

        let region = holder.verification_region().await;
        let desired = InterfacePhysicalOptions {
            description: Some("uplink".to_string()),
            ..InterfacePhysicalOptions::new("ge-0/0/1")
        };
        let create = tokio::spawn(async move { other.create_interface_physical(&desired).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!create.is_finished(), "verification must wait for the region");
        assert_eq!(device.commit_log().await.len(), 1);

        drop(region);
        let outcome = create.await.unwrap().unwrap();
        assert!(outcome.is_changed());
    }

    #[tokio::test]
    async fn test_full_channel_drops_events() {
        let (tx, mut rx) = mpsc::channel(1);
        emit(
            &tx,
            EngineEvent::Unchanged {
                kind: "k",
                name: "a".to_string(),
            },
        );
        emit(
            &tx,
            EngineEvent::Unchanged {
                kind: "k",
                name: "b".to_string(),
            },
        );
        drop(tx);

        assert_eq!(
            rx.recv().await,
            Some(EngineEvent::Unchanged {
                kind: "k",
                name: "a".to_string()
            })
        );
        assert_eq!(rx.recv().await, None);
    }
}
