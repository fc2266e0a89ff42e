//! Tasklist persistence
//!
//! Two backends implement [`TasklistStore`]: an in-memory map for tests and
//! single-process runs, and a directory of pretty-printed JSON files
//! (`<dir>/<plan_id>.json`). Saves are last-writer-wins.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::types::Tasklist;
use crate::plan::PlanId;

/// Error type for tasklist store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid plan id for storage: {0}")]
    InvalidKey(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Store task failed: {0}")]
    TaskFailed(String),
}

/// Result type for tasklist store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence collaborator for tasklists
///
/// Calls are blocking; the orchestrator runs them on the blocking pool.
pub trait TasklistStore: Send + Sync {
    fn load_tasklist(&self, plan_id: &str) -> StoreResult<Option<Tasklist>>;

    fn save_tasklist(&self, plan_id: &str, tasklist: &Tasklist) -> StoreResult<()>;

    fn list_plans(&self) -> StoreResult<Vec<PlanId>>;
}

/// Shared reference to a tasklist store
pub type SharedTasklistStore = Arc<dyn TasklistStore>;

// =========================================================================
// In-memory backend
// =========================================================================

#[derive(Debug, Default)]
pub struct InMemoryTasklistStore {
    tasklists: RwLock<HashMap<PlanId, Tasklist>>,
}

impl InMemoryTasklistStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedTasklistStore {
        Arc::new(self)
    }
}

impl TasklistStore for InMemoryTasklistStore {
    fn load_tasklist(&self, plan_id: &str) -> StoreResult<Option<Tasklist>> {
        let map = self.tasklists.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(map.get(plan_id).cloned())
    }

    fn save_tasklist(&self, plan_id: &str, tasklist: &Tasklist) -> StoreResult<()> {
        let mut map = self.tasklists.write().map_err(|_| StoreError::LockPoisoned)?;
        map.insert(plan_id.to_string(), tasklist.clone());
        Ok(())
    }

    fn list_plans(&self) -> StoreResult<Vec<PlanId>> {
        let map = self.tasklists.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut ids: Vec<PlanId> = map.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// =========================================================================
// JSON file backend
// =========================================================================

/// One JSON file per plan under a state directory
#[derive(Debug, Clone)]
pub struct JsonFileTasklistStore {
    dir: PathBuf,
}

impl JsonFileTasklistStore {
    /// Open the store, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn shared(self) -> SharedTasklistStore {
        Arc::new(self)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, plan_id: &str) -> StoreResult<PathBuf> {
        let valid = !plan_id.is_empty()
            && plan_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidKey(plan_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", plan_id)))
    }
}

impl TasklistStore for JsonFileTasklistStore {
    fn load_tasklist(&self, plan_id: &str) -> StoreResult<Option<Tasklist>> {
        let path = self.path_for(plan_id)?;
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)?;
        let tasklist: Tasklist =
            serde_json::from_str(&json).map_err(|e| StoreError::Deserialization(e.to_string()))?;
        debug!(plan_id, path = %path.display(), "Loaded tasklist");
        Ok(Some(tasklist))
    }

    fn save_tasklist(&self, plan_id: &str, tasklist: &Tasklist) -> StoreResult<()> {
        let path = self.path_for(plan_id)?;
        let json = serde_json::to_string_pretty(tasklist)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        // Write to temp then rename so readers never see a partial file
        let tmp = self.dir.join(format!(".{}.json.tmp", plan_id));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        debug!(plan_id, tasks = tasklist.len(), "Saved tasklist");
        Ok(())
    }

    fn list_plans(&self) -> StoreResult<Vec<PlanId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
