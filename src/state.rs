use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reconcile::{Operation, StateHost};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::manifest::TimeoutOverrides;
use crate::resource::Kind;

/// Current state file format
const STATE_VERSION: u32 = 1;

// ============================================================================
// State Structures
// ============================================================================

/// Everything pinestate tracks, keyed by address (e.g. `index.docs`)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateFile {
    pub version: u32,

    /// Bumped on every write
    #[serde(default)]
    pub serial: u64,

    #[serde(default)]
    pub resources: BTreeMap<String, Record>,

    pub last_updated: DateTime<Utc>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            serial: 0,
            resources: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }
}

/// One tracked remote resource
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Record {
    pub kind: Kind,

    /// Remote id (name for indexes and collections)
    pub id: String,

    /// Declaration the resource was last reconciled against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<Value>,

    /// Last observed remote state
    pub observed: Value,

    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// StateStore
// ============================================================================

/// JSON state file shared by every instance of a run.
///
/// Each write goes straight to disk, so an interrupted run keeps everything
/// observed up to that point.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    file: Mutex<StateFile>,
}

impl StateStore {
    /// Load state from disk, or start empty if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read state file: {}", path.display()))?;
            let file: StateFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
            if file.version > STATE_VERSION {
                anyhow::bail!(
                    "State file {} has version {}, this build understands up to {}",
                    path.display(),
                    file.version,
                    STATE_VERSION
                );
            }
            log::debug!(
                "Loaded {} records from {}",
                file.resources.len(),
                path.display()
            );
            file
        } else {
            log::debug!("State file does not exist, using empty state");
            StateFile::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, StateFile> {
        match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("State lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn save(&self, file: &mut StateFile) -> Result<()> {
        file.serial += 1;
        file.last_updated = Utc::now();

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }
        let content =
            serde_json::to_string_pretty(&*file).context("Failed to serialize state to JSON")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .with_context(|| format!("Failed to write state file: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace state file: {}", self.path.display()))?;

        log::debug!("Saved state (serial {}) to {}", file.serial, self.path.display());
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<Record> {
        self.lock().resources.get(address).cloned()
    }

    /// All tracked records, ordered by address
    pub fn records(&self) -> Vec<(String, Record)> {
        self.lock()
            .resources
            .iter()
            .map(|(address, record)| (address.clone(), record.clone()))
            .collect()
    }

    /// Insert or replace the record at `address` and save.
    pub fn put(
        &self,
        address: &str,
        kind: Kind,
        desired: Option<Value>,
        observed: Value,
    ) -> Result<()> {
        let id = observed
            .get("id")
            .and_then(Value::as_str)
            .context("Observed state has no id")?
            .to_string();

        let mut file = self.lock();
        file.resources.insert(
            address.to_string(),
            Record {
                kind,
                id,
                desired,
                observed,
                updated_at: Utc::now(),
            },
        );
        self.save(&mut file)
    }

    /// Drop the record at `address` and save. Returns whether one existed.
    pub fn remove(&self, address: &str) -> Result<bool> {
        let mut file = self.lock();
        if file.resources.remove(address).is_none() {
            return Ok(false);
        }
        self.save(&mut file)?;
        Ok(true)
    }
}

// ============================================================================
// RecordHost
// ============================================================================

/// Configuration host for one instance, backed by a [`StateStore`] record
pub struct RecordHost<D, O> {
    store: Arc<StateStore>,
    address: String,
    kind: Kind,
    desired: Option<D>,
    timeouts: TimeoutOverrides,
    observed: PhantomData<fn() -> O>,
}

impl<D, O> RecordHost<D, O> {
    pub fn new(
        store: Arc<StateStore>,
        address: impl Into<String>,
        kind: Kind,
        desired: Option<D>,
        timeouts: TimeoutOverrides,
    ) -> Self {
        Self {
            store,
            address: address.into(),
            kind,
            desired,
            timeouts,
            observed: PhantomData,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_declared(&self) -> bool {
        self.desired.is_some()
    }

    pub fn is_tracked(&self) -> bool {
        self.store.get(&self.address).is_some()
    }

    /// Remote id from the stored record
    pub fn remote_id(&self) -> Option<String> {
        self.store.get(&self.address).map(|record| record.id)
    }
}

impl<D, O> StateHost<D, O> for RecordHost<D, O>
where
    D: Clone + Serialize,
    O: Serialize + DeserializeOwned,
{
    fn desired(&self) -> Option<D> {
        self.desired.clone()
    }

    fn prior(&self) -> Result<Option<O>> {
        let Some(record) = self.store.get(&self.address) else {
            return Ok(None);
        };
        serde_json::from_value(record.observed)
            .map(Some)
            .with_context(|| format!("Unreadable observed state for {}", self.address))
    }

    fn tracked_id(&self) -> Option<String> {
        self.remote_id()
    }

    fn set_observed(&mut self, observed: &O) -> Result<()> {
        let observed =
            serde_json::to_value(observed).context("Failed to serialize observed state")?;
        let desired = self
            .desired
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("Failed to serialize declaration")?;
        self.store.put(&self.address, self.kind, desired, observed)
    }

    fn timeout_override(&self, op: Operation) -> Option<Duration> {
        self.timeouts.get(op)
    }

    fn remove_tracking(&mut self) -> Result<()> {
        if self.store.remove(&self.address)? {
            log::debug!("Stopped tracking {}", self.address);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Arc<StateStore> {
        Arc::new(StateStore::load(&dir.path().join("pinestate.state.json")).unwrap())
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.records().is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_put_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .put(
                "index.docs",
                Kind::Index,
                Some(json!({"name": "docs"})),
                json!({"id": "docs", "status": "Ready"}),
            )
            .unwrap();

        let reloaded = StateStore::load(store.path()).unwrap();
        let record = reloaded.get("index.docs").unwrap();
        assert_eq!(record.kind, Kind::Index);
        assert_eq!(record.id, "docs");
        assert_eq!(record.observed["status"], "Ready");
        assert_eq!(reloaded.lock().serial, 1);
    }

    #[test]
    fn test_put_requires_id() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir)
            .put("index.docs", Kind::Index, None, json!({"name": "docs"}))
            .unwrap_err();
        assert!(err.to_string().contains("no id"));
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .put("project.search", Kind::Project, None, json!({"id": "proj-1"}))
            .unwrap();
        assert!(store.remove("project.search").unwrap());
        assert!(!store.remove("project.search").unwrap());
        assert!(StateStore::load(store.path()).unwrap().records().is_empty());
    }

    #[test]
    fn test_newer_version_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(
            &path,
            r#"{"version": 99, "resources": {}, "last_updated": "2025-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let err = StateStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("version 99"));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: String,
        size: u32,
    }

    #[test]
    fn test_record_host_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let timeouts = TimeoutOverrides {
            create: Some(Duration::from_secs(90)),
            ..Default::default()
        };
        let mut host: RecordHost<String, Widget> = RecordHost::new(
            Arc::clone(&store),
            "index.w",
            Kind::Index,
            Some("declared".to_string()),
            timeouts,
        );
        assert!(host.prior().unwrap().is_none());
        assert!(!host.is_tracked());

        let widget = Widget {
            id: "w-1".to_string(),
            size: 3,
        };
        host.set_observed(&widget).unwrap();
        assert_eq!(host.prior().unwrap(), Some(widget));
        assert_eq!(host.remote_id().as_deref(), Some("w-1"));
        assert_eq!(store.get("index.w").unwrap().desired, Some(json!("declared")));
        assert_eq!(
            host.timeout_override(Operation::Create),
            Some(Duration::from_secs(90))
        );
        assert_eq!(host.timeout_override(Operation::Delete), None);

        host.remove_tracking().unwrap();
        assert!(host.prior().unwrap().is_none());
    }

    #[test]
    fn test_unreadable_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .put("index.w", Kind::Index, None, json!({"id": "w-1", "size": "big"}))
            .unwrap();
        let host: RecordHost<String, Widget> =
            RecordHost::new(store, "index.w", Kind::Index, None, TimeoutOverrides::default());
        assert!(host.prior().is_err());
        assert_eq!(host.tracked_id().as_deref(), Some("w-1"));
    }
}
