// # Memory Device
//
// In-memory emulation of a Junos device's configuration database.
//
// ## Purpose
//
// Provides a device that speaks the same query and statement dialect as a
// real one, without any transport. Useful for testing, dry runs and offline
// planning.
//
// ## Emulated Behavior
//
// - Committed configuration is a list of statements, each kept as
//   quote-aware words
// - `lock()` waits for the exclusive configuration lock (bounded by the lock
//   timeout) and copies the committed configuration into a private candidate
// - `set` appends a statement, replacing the previous value of single-valued
//   leaves such as `description` or `device-count`
// - `delete` removes every statement under the path
// - Queries of a locked session see its candidate, others see the committed
//   configuration
// - `show interfaces <name> terse` answers from the hardware inventory plus
//   `ae0` .. `ae<device-count - 1>`
//
// ## Crash Behavior
//
// - All state is lost on restart/crash (see `FileDevice` for persistence)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::Error;
use crate::aggregate::{AeName, DEVICE_COUNT_PATH};
use crate::config::DeviceConfig;
use crate::statement::{
    Action, ConfigStatement, EMPTY_OUTPUT, OUTPUT_CLOSE, OUTPUT_OPEN, render_tokens, tokenize,
};
use crate::traits::{DeviceConnector, DeviceConnectorFactory, DeviceSession};

/// Leaves holding a single value: setting one replaces the previous value
const SINGLE_VALUE_LEAVES: &[&str] = &[
    "802.3ad",
    "description",
    "device-count",
    "df-election-type",
    "interface-mode",
    "lacp",
    "limit",
    "link-speed",
    "minimum-links",
    "native-vlan-id",
    "over-limit",
    "source-bmac",
];

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Serializable device content
///
/// `configuration` holds statement paths without the `set` keyword,
/// e.g. `interfaces ge-0/0/1 description "to core"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Physical interfaces present in the hardware inventory
    #[serde(default)]
    pub inventory: Vec<String>,
    /// Committed statements
    #[serde(default)]
    pub configuration: Vec<String>,
}

impl DeviceSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Add physical interfaces to the inventory
    pub fn with_inventory<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inventory.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add committed statements (`set ` prefix optional)
    pub fn with_statements<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in statements {
            let line = line.as_ref().trim();
            let path = line.strip_prefix("set ").unwrap_or(line).trim();
            if !path.is_empty() {
                self.configuration.push(path.to_string());
            }
        }
        self
    }
}

/// A commit accepted by the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit log description
    pub description: String,
    /// Statements staged in the committed transaction, in order
    pub statements: Vec<ConfigStatement>,
    /// When the commit happened
    pub committed_at: DateTime<Utc>,
}

type Words = Vec<String>;

/// Statement store with device semantics
#[derive(Debug, Clone, Default)]
struct ConfigTree {
    statements: Vec<Words>,
}

impl ConfigTree {
    fn from_paths(paths: &[String]) -> Self {
        let mut tree = Self::default();
        for path in paths {
            tree.set(tokenize(path));
        }
        tree
    }

    fn paths(&self) -> Vec<String> {
        self.statements.iter().map(|w| render_tokens(w)).collect()
    }

    fn apply(&mut self, statement: &ConfigStatement) {
        let words = tokenize(&statement.path);
        if words.is_empty() {
            return;
        }
        match statement.action {
            Action::Set => self.set(words),
            Action::Delete => self.delete(&words),
        }
    }

    fn set(&mut self, words: Words) {
        if words.is_empty() || self.statements.iter().any(|s| s.starts_with(&words)) {
            return;
        }

        let len = words.len();
        let single_valued = len >= 2 && {
            let leaf = words[len - 2].as_str();
            SINGLE_VALUE_LEAVES.contains(&leaf) || leaf.ends_with("-profile")
        };
        if single_valued {
            let leaf = &words[..len - 1];
            self.statements
                .retain(|s| !(s.len() == len && s[..len - 1] == *leaf));
        }

        // a bare container becomes implicit once something is set below it
        self.statements
            .retain(|s| !(s.len() < len && words.starts_with(s)));
        self.statements.push(words);
    }

    fn delete(&mut self, words: &[String]) {
        self.statements.retain(|s| !s.starts_with(words));
    }

    fn under<'a>(&'a self, path: &'a [String]) -> impl Iterator<Item = &'a Words> + 'a {
        self.statements.iter().filter(move |s| s.starts_with(path))
    }

    fn device_count(&self) -> Option<u32> {
        let path = tokenize(DEVICE_COUNT_PATH);
        self.under(&path)
            .filter_map(|s| s.get(path.len()))
            .filter_map(|v| v.parse().ok())
            .last()
    }

    /// `show configuration <path> | display set [relative]`
    fn show(&self, path: &str, relative: bool) -> String {
        let prefix = tokenize(path);
        let mut lines = Vec::new();
        for statement in self.under(&prefix) {
            let words = if relative {
                &statement[prefix.len()..]
            } else {
                &statement[..]
            };
            if words.is_empty() {
                continue;
            }
            lines.push(format!("set {}", render_tokens(words)));
        }

        if lines.is_empty() {
            return EMPTY_OUTPUT.to_string();
        }
        format!("{}\n{}\n{}\n", OUTPUT_OPEN, lines.join("\n"), OUTPUT_CLOSE)
    }
}

/// Shared device state
#[derive(Debug)]
struct DeviceState {
    name: String,
    inventory: Vec<String>,
    committed: RwLock<ConfigTree>,
    config_lock: Arc<Mutex<()>>,
    commit_log: RwLock<Vec<CommitRecord>>,
    lock_timeout: Duration,
}

impl DeviceState {
    fn inventory_contains(&self, tree: &ConfigTree, name: &str) -> bool {
        if self.inventory.iter().any(|i| i == name) {
            return true;
        }
        match (AeName::parse(name), tree.device_count()) {
            (Some(ae), Some(count)) => ae.index() < count,
            _ => false,
        }
    }

    fn answer(&self, tree: &ConfigTree, command: &str) -> Result<String, Error> {
        let command = command.trim();

        if let Some(rest) = command.strip_prefix("show configuration") {
            let (path, display) = match rest.split_once('|') {
                Some((path, display)) => (path.trim(), display.trim()),
                None => (rest.trim(), ""),
            };
            return match display {
                "display set relative" => Ok(tree.show(path, true)),
                "display set" => Ok(tree.show(path, false)),
                other => Err(Error::transport(format!(
                    "{}: unsupported display option '{}'",
                    self.name, other
                ))),
            };
        }

        if let Some(name) = command
            .strip_prefix("show interfaces ")
            .and_then(|rest| rest.strip_suffix(" terse"))
        {
            let name = name.trim();
            return if self.inventory_contains(tree, name) {
                Ok(format!(
                    "Interface               Admin Link Proto    Local                 Remote\n{:<24}up    up\n",
                    name
                ))
            } else {
                Ok(format!("error: device {} not found\n", name))
            };
        }

        Err(Error::transport(format!(
            "{}: syntax error, expecting <command>: {}",
            self.name, command
        )))
    }
}

/// In-memory emulated device
///
/// Cloning shares the same device.
///
/// # Example
///
/// ```rust,no_run
/// use jsync_core::session::{DeviceSnapshot, MemoryDevice};
/// use jsync_core::traits::DeviceConnector;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let device = MemoryDevice::from_snapshot(
///         "lab1",
///         DeviceSnapshot::new()
///             .with_inventory(["ge-0/0/1"])
///             .with_statements(["set interfaces ge-0/0/1 description uplink"]),
///     );
///
///     let session = device.connect().await?;
///     let reply = session
///         .run_query("show configuration interfaces ge-0/0/1 | display set relative")
///         .await?;
///     assert!(reply.contains("set description uplink"));
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    state: Arc<DeviceState>,
}

impl MemoryDevice {
    /// Create an empty device
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_snapshot(name, DeviceSnapshot::new())
    }

    /// Create a device holding `snapshot`
    pub fn from_snapshot(name: impl Into<String>, snapshot: DeviceSnapshot) -> Self {
        Self::with_lock_timeout(name, snapshot, DEFAULT_LOCK_TIMEOUT)
    }

    /// Create a device holding `snapshot` whose lock waits at most `lock_timeout`
    pub fn with_lock_timeout(
        name: impl Into<String>,
        snapshot: DeviceSnapshot,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            state: Arc::new(DeviceState {
                name: name.into(),
                inventory: snapshot.inventory,
                committed: RwLock::new(ConfigTree::from_paths(&snapshot.configuration)),
                config_lock: Arc::new(Mutex::new(())),
                commit_log: RwLock::new(Vec::new()),
                lock_timeout,
            }),
        }
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Current committed content
    pub async fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            inventory: self.state.inventory.clone(),
            configuration: self.state.committed.read().await.paths(),
        }
    }

    /// Committed configuration rendered as `set` lines
    pub async fn configuration(&self) -> Vec<String> {
        self.state
            .committed
            .read()
            .await
            .paths()
            .into_iter()
            .map(|p| format!("set {}", p))
            .collect()
    }

    /// Every commit accepted so far, oldest first
    pub async fn commit_log(&self) -> Vec<CommitRecord> {
        self.state.commit_log.read().await.clone()
    }

    /// Open a concrete session
    pub fn open_session(&self) -> MemorySession {
        MemorySession {
            state: self.state.clone(),
            candidate: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DeviceConnector for MemoryDevice {
    async fn connect(&self) -> Result<Box<dyn DeviceSession>, Error> {
        debug!("Opening session to {}", self.state.name);
        Ok(Box::new(self.open_session()))
    }

    fn connector_name(&self) -> &'static str {
        "memory"
    }
}

/// Locked candidate of one session
#[derive(Debug)]
struct Candidate {
    _guard: OwnedMutexGuard<()>,
    tree: ConfigTree,
    staged: Vec<ConfigStatement>,
}

/// Session to a [`MemoryDevice`]
#[derive(Debug)]
pub struct MemorySession {
    state: Arc<DeviceState>,
    candidate: Mutex<Option<Candidate>>,
}

#[async_trait]
impl DeviceSession for MemorySession {
    async fn run_query(&self, command: &str) -> Result<String, Error> {
        let candidate = self.candidate.lock().await;
        match candidate.as_ref() {
            Some(candidate) => self.state.answer(&candidate.tree, command),
            None => {
                let committed = self.state.committed.read().await;
                self.state.answer(&committed, command)
            }
        }
    }

    async fn apply_statements(&self, statements: &[ConfigStatement]) -> Result<(), Error> {
        let mut guard = self.candidate.lock().await;
        let candidate = guard.as_mut().ok_or_else(|| {
            Error::transport(format!(
                "{}: configuration database is not locked by this session",
                self.state.name
            ))
        })?;

        for statement in statements {
            if statement.path.trim().is_empty() {
                return Err(Error::transport(format!(
                    "{}: syntax error in '{}'",
                    self.state.name, statement
                )));
            }
            candidate.tree.apply(statement);
            candidate.staged.push(statement.clone());
        }
        Ok(())
    }

    async fn lock(&self) -> Result<(), Error> {
        let mut guard = self.candidate.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let lock = tokio::time::timeout(
            self.state.lock_timeout,
            self.state.config_lock.clone().lock_owned(),
        )
        .await
        .map_err(|_| {
            Error::transport(format!(
                "{}: configuration database locked by another session",
                self.state.name
            ))
        })?;

        let tree = self.state.committed.read().await.clone();
        *guard = Some(Candidate {
            _guard: lock,
            tree,
            staged: Vec::new(),
        });
        debug!("Configuration of {} locked", self.state.name);
        Ok(())
    }

    async fn commit(&self, description: &str) -> Result<Vec<String>, Error> {
        let mut guard = self.candidate.lock().await;
        let candidate = guard.take().ok_or_else(|| {
            Error::transport(format!(
                "{}: commit without configuration lock",
                self.state.name
            ))
        })?;

        *self.state.committed.write().await = candidate.tree;
        self.state.commit_log.write().await.push(CommitRecord {
            description: description.to_string(),
            statements: candidate.staged,
            committed_at: Utc::now(),
        });

        info!("{}: commit complete ({})", self.state.name, description);
        Ok(Vec::new())
    }

    async fn discard_pending(&self) {
        if let Some(candidate) = self.candidate.lock().await.take() {
            debug!(
                "{}: discarded {} staged statements",
                self.state.name,
                candidate.staged.len()
            );
        }
    }

    async fn close(&self) {
        self.discard_pending().await;
    }

    fn device_name(&self) -> &str {
        &self.state.name
    }
}

/// Factory for [`MemoryDevice`] connectors
pub struct MemoryDeviceFactory;

impl DeviceConnectorFactory for MemoryDeviceFactory {
    fn create(&self, config: &DeviceConfig) -> Result<Arc<dyn DeviceConnector>, Error> {
        match config {
            DeviceConfig::Memory {
                name,
                inventory,
                configuration,
                lock_timeout_secs,
            } => Ok(Arc::new(MemoryDevice::with_lock_timeout(
                name.clone(),
                DeviceSnapshot::new()
                    .with_inventory(inventory.iter().cloned())
                    .with_statements(configuration),
                Duration::from_secs(*lock_timeout_secs),
            ))),
            other => Err(Error::config(format!(
                "Memory device factory cannot build a '{}' device",
                other.type_name()
            ))),
        }
    }
}
