// # File Device
//
// Emulated device whose committed configuration survives restarts.
//
// ## Purpose
//
// Wraps a `MemoryDevice` loaded from a JSON device file and writes the
// committed configuration back after every successful commit. Lets the
// `jsyncctl` binary run operation after operation against the same device.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good device file
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "inventory": ["ge-0/0/0", "ge-0/0/1"],
//   "configuration": [
//     "interfaces ge-0/0/0 description \"to core\"",
//     "chassis aggregated-devices ethernet device-count 2"
//   ]
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell};

use super::memory::{DeviceSnapshot, MemoryDevice, MemorySession};
use crate::Error;
use crate::config::DeviceConfig;
use crate::statement::ConfigStatement;
use crate::traits::{DeviceConnector, DeviceConnectorFactory, DeviceSession};

/// Device file format version
/// Used for future migration if format changes
const DEVICE_FILE_VERSION: &str = "1.0";

/// Serializable device file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct DeviceFileFormat {
    version: String,
    #[serde(flatten)]
    snapshot: DeviceSnapshot,
}

/// File-backed emulated device
///
/// The file is loaded on first use. Cloning shares the same device.
///
/// # Example
///
/// ```rust,no_run
/// use jsync_core::session::FileDevice;
/// use jsync_core::traits::DeviceConnector;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let device = FileDevice::open("/var/lib/jsync/lab1.json").await?;
///
///     let session = device.connect().await?;
///     let reply = session.run_query("show configuration | display set").await?;
///     println!("{}", reply);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileDevice {
    inner: Arc<FileDeviceInner>,
}

#[derive(Debug)]
struct FileDeviceInner {
    path: PathBuf,
    lock_timeout: Duration,
    device: OnceCell<MemoryDevice>,
    write_lock: Mutex<()>,
}

impl FileDevice {
    /// Create a device backed by `path` without touching the file yet
    pub fn new<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(FileDeviceInner {
                path: path.as_ref().to_path_buf(),
                lock_timeout,
                device: OnceCell::new(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Create and load a device backed by `path`
    ///
    /// This will:
    /// 1. Try to load existing device file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with an empty device
    /// 4. Create parent directories if needed
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let device = Self::new(path, Duration::from_secs(30));
        device.device().await?;
        Ok(device)
    }

    /// Path of the device file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The loaded device
    pub async fn device(&self) -> Result<&MemoryDevice, Error> {
        self.inner
            .device
            .get_or_try_init(|| async {
                let path = &self.inner.path;
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        fs::create_dir_all(parent).await.map_err(|e| {
                            Error::config(format!(
                                "Failed to create device directory {}: {}",
                                parent.display(),
                                e
                            ))
                        })?;
                    }
                }

                let snapshot = Self::load_with_recovery(path).await?;
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "file0".to_string());
                Ok::<_, Error>(MemoryDevice::with_lock_timeout(
                    name,
                    snapshot,
                    self.inner.lock_timeout,
                ))
            })
            .await
    }

    /// Load device file with automatic recovery
    async fn load_with_recovery(path: &Path) -> Result<DeviceSnapshot, Error> {
        match Self::load(path).await {
            Ok(snapshot) => {
                tracing::debug!(
                    "Loaded device file {}: {} statements",
                    path.display(),
                    snapshot.configuration.len()
                );
                Ok(snapshot)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Device file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with an empty device.");
                    return Ok(DeviceSnapshot::new());
                }

                match Self::load(&backup_path).await {
                    Ok(snapshot) => {
                        tracing::info!(
                            "Recovered device from backup: {} statements",
                            snapshot.configuration.len()
                        );
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore device file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(snapshot)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with an empty device.",
                            backup_err
                        );
                        Ok(DeviceSnapshot::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<DeviceSnapshot, Error> {
        if !path.exists() {
            tracing::debug!("Device file does not exist: {}", path.display());
            return Ok(DeviceSnapshot::new());
        }

        let content = fs::read_to_string(path).await?;
        let file: DeviceFileFormat = serde_json::from_str(&content)?;

        if file.version != DEVICE_FILE_VERSION {
            tracing::warn!(
                "Device file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                DEVICE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.snapshot)
    }

    /// Write the committed configuration to disk atomically
    pub async fn persist(&self) -> Result<(), Error> {
        let _write = self.inner.write_lock.lock().await;
        let device = self.device().await?;

        let file = DeviceFileFormat {
            version: DEVICE_FILE_VERSION.to_string(),
            snapshot: device.snapshot().await,
        };
        let json = serde_json::to_string_pretty(&file)?;

        let path = &self.inner.path;
        let temp_path = Self::temp_path(path);
        {
            let mut out = fs::File::create(&temp_path).await?;
            out.write_all(json.as_bytes()).await?;
            out.flush().await?;
        }

        if path.exists() {
            if let Err(e) = fs::copy(path, Self::backup_path(path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, path).await.map_err(|e| {
            Error::Other(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::trace!("Device written to file: {}", path.display());
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let mut temp = path.to_path_buf();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl DeviceConnector for FileDevice {
    async fn connect(&self) -> Result<Box<dyn DeviceSession>, Error> {
        let inner = self.device().await?.open_session();
        Ok(Box::new(FileSession {
            inner,
            file: self.clone(),
        }))
    }

    fn connector_name(&self) -> &'static str {
        "file"
    }
}

/// Session to a [`FileDevice`]: a memory session that persists on commit
struct FileSession {
    inner: MemorySession,
    file: FileDevice,
}

#[async_trait]
impl DeviceSession for FileSession {
    async fn run_query(&self, command: &str) -> Result<String, Error> {
        self.inner.run_query(command).await
    }

    async fn apply_statements(&self, statements: &[ConfigStatement]) -> Result<(), Error> {
        self.inner.apply_statements(statements).await
    }

    async fn lock(&self) -> Result<(), Error> {
        self.inner.lock().await
    }

    async fn commit(&self, description: &str) -> Result<Vec<String>, Error> {
        let warnings = self.inner.commit(description).await?;
        self.file.persist().await?;
        Ok(warnings)
    }

    async fn discard_pending(&self) {
        self.inner.discard_pending().await
    }

    async fn close(&self) {
        self.inner.close().await
    }

    fn device_name(&self) -> &str {
        self.inner.device_name()
    }
}

/// Factory for [`FileDevice`] connectors
pub struct FileDeviceFactory;

impl DeviceConnectorFactory for FileDeviceFactory {
    fn create(&self, config: &DeviceConfig) -> Result<Arc<dyn DeviceConnector>, Error> {
        match config {
            DeviceConfig::File { path, .. } => {
                Ok(Arc::new(FileDevice::new(path, config.lock_timeout())))
            }
            other => Err(Error::config(format!(
                "File device factory cannot build a '{}' device",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn commit(device: &FileDevice, statement: &str) {
        let session = device.connect().await.unwrap();
        session.lock().await.unwrap();
        session
            .apply_statements(&[ConfigStatement::set(statement)])
            .await
            .unwrap();
        session.commit("test").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_device_persists_commits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lab1.json");

        let device = FileDevice::open(&path).await.unwrap();
        assert!(!path.exists());

        commit(&device, "interfaces ge-0/0/1 description \"to core\"").await;
        assert!(path.exists());

        let reloaded = FileDevice::open(&path).await.unwrap();
        let loaded = reloaded.device().await.unwrap();
        assert_eq!(loaded.name(), "lab1");
        assert_eq!(
            loaded.configuration().await,
            vec!["set interfaces ge-0/0/1 description \"to core\""]
        );
    }

    #[tokio::test]
    async fn test_file_device_reads_inventory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lab2.json");
        fs::write(
            &path,
            r#"{"version": "1.0", "inventory": ["xe-0/0/3"], "configuration": []}"#,
        )
        .await
        .unwrap();

        let device = FileDevice::open(&path).await.unwrap();
        let session = device.connect().await.unwrap();
        let reply = session.run_query("show interfaces xe-0/0/3 terse").await.unwrap();
        assert!(!reply.contains(" not found"));
    }

    #[tokio::test]
    async fn test_file_device_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lab3.json");

        let device = FileDevice::open(&path).await.unwrap();
        commit(&device, "interfaces ge-0/0/1 disable").await;
        commit(&device, "interfaces ge-0/0/2 disable").await;

        let backup_path = FileDevice::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileDevice::open(&path).await.unwrap();
        assert_eq!(
            recovered.device().await.unwrap().configuration().await,
            vec!["set interfaces ge-0/0/1 disable"],
            "Backup should contain previous state, not latest"
        );
    }

    #[test]
    fn test_factory_rejects_other_types() {
        assert!(FileDeviceFactory.create(&DeviceConfig::default()).is_err());
    }
}
