//! Test doubles and common utilities for contract tests
//!
//! The recording connector wraps an emulated device, counts every
//! collaborator call and can inject failures at each transaction step.

#![allow(dead_code)]

use jsync_core::config::{EngineConfig, InterfaceConfig, SyncConfig};
use jsync_core::error::{Error, Result};
use jsync_core::session::{DeviceSnapshot, MemoryDevice, MemorySession};
use jsync_core::statement::ConfigStatement;
use jsync_core::traits::{DeviceConnector, DeviceSession};
use jsync_core::{EngineEvent, SyncEngine};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Call counters shared by every session of a connector
#[derive(Debug, Default)]
pub struct CallCounters {
    pub connects: AtomicUsize,
    pub queries: AtomicUsize,
    pub locks: AtomicUsize,
    pub applies: AtomicUsize,
    pub commits: AtomicUsize,
    pub discards: AtomicUsize,
    pub closes: AtomicUsize,
    /// Descriptions of accepted commits
    pub descriptions: std::sync::Mutex<Vec<String>>,
}

impl CallCounters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Failures to inject
#[derive(Debug, Default)]
pub struct Faults {
    pub fail_lock: AtomicBool,
    pub fail_apply: AtomicBool,
    pub fail_commit: AtomicBool,
    /// Acknowledge commits without applying them
    pub drop_commits: AtomicBool,
    /// Warnings returned by successful commits
    pub commit_warnings: std::sync::Mutex<Vec<String>>,
    /// Statements another writer commits when the next inventory query runs
    pub concurrent_write: std::sync::Mutex<Vec<String>>,
}

/// A connector to a MemoryDevice that records calls
#[derive(Clone)]
pub struct RecordingConnector {
    device: MemoryDevice,
    counters: Arc<CallCounters>,
    faults: Arc<Faults>,
}

impl RecordingConnector {
    pub fn new(device: MemoryDevice) -> Self {
        Self {
            device,
            counters: Arc::new(CallCounters::default()),
            faults: Arc::new(Faults::default()),
        }
    }

    /// Create a connector to the same device that shares counters and faults
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            device: other.device.clone(),
            counters: Arc::clone(&other.counters),
            faults: Arc::clone(&other.faults),
        }
    }

    pub fn device(&self) -> &MemoryDevice {
        &self.device
    }

    pub fn counters(&self) -> &CallCounters {
        &self.counters
    }

    pub fn faults(&self) -> &Faults {
        &self.faults
    }

    pub fn commit_count(&self) -> usize {
        CallCounters::get(&self.counters.commits)
    }

    pub fn discard_count(&self) -> usize {
        CallCounters::get(&self.counters.discards)
    }

    pub fn commit_descriptions(&self) -> Vec<String> {
        self.counters.descriptions.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl DeviceConnector for RecordingConnector {
    async fn connect(&self) -> Result<Box<dyn DeviceSession>> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSession {
            device: self.device.clone(),
            inner: self.device.open_session(),
            counters: Arc::clone(&self.counters),
            faults: Arc::clone(&self.faults),
        }))
    }

    fn connector_name(&self) -> &'static str {
        "recording"
    }
}

/// Session handed out by RecordingConnector
pub struct RecordingSession {
    device: MemoryDevice,
    inner: MemorySession,
    counters: Arc<CallCounters>,
    faults: Arc<Faults>,
}

#[async_trait::async_trait]
impl DeviceSession for RecordingSession {
    async fn run_query(&self, command: &str) -> Result<String> {
        self.counters.queries.fetch_add(1, Ordering::SeqCst);
        if command.starts_with("show interfaces ") {
            let pending = std::mem::take(&mut *self.faults.concurrent_write.lock().unwrap());
            if !pending.is_empty() {
                commit_as_other_writer(&self.device, &pending).await?;
            }
        }
        self.inner.run_query(command).await
    }

    async fn apply_statements(&self, statements: &[ConfigStatement]) -> Result<()> {
        self.counters.applies.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_apply.load(Ordering::SeqCst) {
            return Err(Error::transport("load-configuration failed: syntax error"));
        }
        self.inner.apply_statements(statements).await
    }

    async fn lock(&self) -> Result<()> {
        self.counters.locks.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_lock.load(Ordering::SeqCst) {
            return Err(Error::transport("configuration database modified"));
        }
        self.inner.lock().await
    }

    async fn commit(&self, description: &str) -> Result<Vec<String>> {
        if self.faults.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::transport("commit failed: configuration check-out failed"));
        }
        if self.faults.drop_commits.load(Ordering::SeqCst) {
            self.inner.discard_pending().await;
        } else {
            self.inner.commit(description).await?;
        }
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        self.counters
            .descriptions
            .lock()
            .unwrap()
            .push(description.to_string());
        Ok(self.faults.commit_warnings.lock().unwrap().clone())
    }

    async fn discard_pending(&self) {
        self.counters.discards.fetch_add(1, Ordering::SeqCst);
        self.inner.discard_pending().await
    }

    async fn close(&self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }

    fn device_name(&self) -> &str {
        self.inner.device_name()
    }
}

/// Commit `lines` through a session the engine doesn't know about
async fn commit_as_other_writer(device: &MemoryDevice, lines: &[String]) -> Result<()> {
    let statements: Vec<ConfigStatement> = lines
        .iter()
        .filter_map(|line| ConfigStatement::parse(line))
        .collect();
    let writer = device.open_session();
    writer.lock().await?;
    writer.apply_statements(&statements).await?;
    writer.commit("other writer").await?;
    writer.close().await;
    Ok(())
}

/// Memory device with `inventory` and committed `statements`
pub fn memory_device(inventory: &[&str], statements: &[&str]) -> MemoryDevice {
    MemoryDevice::from_snapshot(
        "lab1",
        DeviceSnapshot::new()
            .with_inventory(inventory.iter().copied())
            .with_statements(statements.iter().copied()),
    )
}

/// Helper to create a minimal SyncConfig for testing
pub fn minimal_config() -> SyncConfig {
    SyncConfig {
        device: jsync_core::DeviceConfig::default(),
        interface: InterfaceConfig::default(),
        engine: EngineConfig {
            event_channel_capacity: 100,
        },
    }
}

/// Build an engine over `connector`
pub fn engine_for(
    connector: &RecordingConnector,
    config: &SyncConfig,
) -> (SyncEngine, mpsc::Receiver<EngineEvent>) {
    SyncEngine::new(
        Arc::new(RecordingConnector::sharing_counters_with(connector)),
        config,
    )
    .expect("engine construction succeeds")
}

/// Collect every event emitted so far
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Render statements as device lines
pub fn rendered(statements: &[ConfigStatement]) -> Vec<String> {
    statements.iter().map(ToString::to_string).collect()
}
