//! Lock file management (package-lock.yml)
//!
//! Records exactly which version and content digest was installed for
//! each plugin, keyed by its catalog identifier.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{MpmError, Result};

/// Default lock file name, next to package.yml
pub const LOCK_FILE: &str = "package-lock.yml";

/// The persisted lock state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageLock {
    /// When this lock file was last written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<String>,
    #[serde(default)]
    pub plugins: BTreeMap<String, LockEntry>,
}

/// One installed plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub name: String,
    /// Resolved version label
    pub version: String,
    /// Hex digest of the bytes on disk
    pub hash: String,
    /// File name inside the plugins directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl PackageLock {
    /// Load the lock file, or an empty lock if it does not exist
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    /// Replace the lock file in one step.
    ///
    /// Every failure is reported as [`MpmError::Persistence`].
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let persistence = |source: std::io::Error| MpmError::Persistence {
            path: path.to_path_buf(),
            source,
        };

        let mut lock = self.clone();
        lock.generated = Some(chrono::Utc::now().to_rfc3339());
        let content = serde_yaml_ng::to_string(&lock)
            .map_err(|e| persistence(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(persistence)?;

        let mut staging = tempfile::Builder::new()
            .prefix(".package-lock-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(persistence)?;
        staging
            .write_all(content.as_bytes())
            .and_then(|_| staging.as_file().sync_all())
            .map_err(persistence)?;
        staging.persist(path).map_err(|e| persistence(e.error))?;

        tracing::debug!("Wrote {} lock entries to {}", self.plugins.len(), path.display());
        Ok(())
    }

    /// Add or replace the entry for `key`
    pub fn record(&mut self, key: impl Into<String>, entry: LockEntry) {
        self.plugins.insert(key.into(), entry);
    }

    pub fn remove(&mut self, key: &str) -> Option<LockEntry> {
        self.plugins.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&LockEntry> {
        self.plugins.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.plugins.contains_key(key)
    }

    /// Overlay entries accumulated during a run
    pub fn merge(&mut self, entries: BTreeMap<String, LockEntry>) {
        self.plugins.extend(entries);
    }
}

/// Lock entries gathered by concurrent jobs.
///
/// Cloning shares the same map. Nothing is written to disk from here; the
/// caller merges the result once every job has finished.
#[derive(Debug, Clone, Default)]
pub struct LockAccumulator {
    entries: Arc<Mutex<BTreeMap<String, LockEntry>>>,
}

impl LockAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, key: impl Into<String>, entry: LockEntry) {
        self.entries.lock().await.insert(key.into(), entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drain everything recorded so far
    pub async fn take(&self) -> BTreeMap<String, LockEntry> {
        std::mem::take(&mut *self.entries.lock().await)
    }
}
