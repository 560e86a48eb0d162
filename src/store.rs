//! Client-local persisted state.
//!
//! Stands in for the browser's local storage: a flat string map written to a
//! JSON file. Only the four entry identifiers live here; everything else is
//! owned by the experiment server.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ChainError;

pub const HIT_ID: &str = "hit_id";
pub const WORKER_ID: &str = "worker_id";
pub const ASSIGNMENT_ID: &str = "assignment_id";
pub const MODE: &str = "mode";

/// The identifiers a participant arrives with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIds {
    pub hit_id: String,
    pub worker_id: String,
    pub assignment_id: String,
    pub mode: String,
}

impl SessionIds {
    /// Read the identifiers from the query string of an entry URL.
    ///
    /// All four parameters are required.
    pub fn from_entry_url(entry: &str) -> Result<Self, ChainError> {
        let url = Url::parse(entry)
            .map_err(|e| ChainError::Config(format!("invalid entry URL '{entry}': {e}")))?;
        let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        let take = |key: &str| {
            pairs
                .get(key)
                .cloned()
                .ok_or_else(|| ChainError::Config(format!("entry URL is missing '{key}'")))
        };
        Ok(Self {
            hit_id: take(HIT_ID)?,
            worker_id: take(WORKER_ID)?,
            assignment_id: take(ASSIGNMENT_ID)?,
            mode: take(MODE)?,
        })
    }

    /// Fresh identifiers for a debug session, the way the server's debug
    /// recruiter hands them out.
    pub fn generate_debug() -> Self {
        let id = || uuid::Uuid::new_v4().simple().to_string();
        Self {
            hit_id: id(),
            worker_id: id(),
            assignment_id: id(),
            mode: "debug".to_string(),
        }
    }

    /// The server's unique participant key.
    pub fn unique_id(&self) -> String {
        format!("{}:{}", self.worker_id, self.assignment_id)
    }

    /// Write the four identifiers to `store`.
    pub fn save(&self, store: &mut LocalStore) -> Result<(), ChainError> {
        store.set(HIT_ID, &self.hit_id)?;
        store.set(WORKER_ID, &self.worker_id)?;
        store.set(ASSIGNMENT_ID, &self.assignment_id)?;
        store.set(MODE, &self.mode)
    }

    /// Read the identifiers back; `None` unless all four are present.
    pub fn load(store: &LocalStore) -> Option<Self> {
        Some(Self {
            hit_id: store.get(HIT_ID)?.to_string(),
            worker_id: store.get(WORKER_ID)?.to_string(),
            assignment_id: store.get(ASSIGNMENT_ID)?.to_string(),
            mode: store.get(MODE)?.to_string(),
        })
    }
}

/// A string map persisted as JSON.
///
/// `path = None` keeps the map in memory only.
#[derive(Debug, Default)]
pub struct LocalStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => {
                serde_json::from_str(&text).map_err(|e| ChainError::json("store", e))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), entries = values.len(), "opened local store");
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set `key` and flush the whole map to disk.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ChainError> {
        self.values.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn flush(&self) -> Result<(), ChainError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let text =
            serde_json::to_string_pretty(&self.values).map_err(|e| ChainError::json("store", e))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> SessionIds {
        SessionIds {
            hit_id: "H1".to_string(),
            worker_id: "W1".to_string(),
            assignment_id: "A1".to_string(),
            mode: "sandbox".to_string(),
        }
    }

    #[test]
    fn entry_url_yields_all_four_ids() {
        let parsed = SessionIds::from_entry_url(
            "http://localhost:5000/consent?hit_id=H1&assignment_id=A1&worker_id=W1&mode=sandbox",
        )
        .unwrap();
        assert_eq!(parsed, ids());
    }

    #[test]
    fn entry_url_missing_param_is_config_error() {
        let err = SessionIds::from_entry_url("http://localhost:5000/consent?hit_id=H1").unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
        assert!(err.to_string().contains("worker_id"));
    }

    #[test]
    fn entry_url_must_parse() {
        assert!(SessionIds::from_entry_url("not a url").is_err());
    }

    #[test]
    fn unique_id_joins_worker_and_assignment() {
        assert_eq!(ids().unique_id(), "W1:A1");
    }

    #[test]
    fn generated_debug_ids_are_distinct() {
        let a = SessionIds::generate_debug();
        let b = SessionIds::generate_debug();
        assert_eq!(a.mode, "debug");
        assert_ne!(a.worker_id, b.worker_id);
    }

    #[test]
    fn load_requires_all_keys() {
        let mut store = LocalStore::in_memory();
        store.set(HIT_ID, "H1").unwrap();
        assert!(SessionIds::load(&store).is_none());
        ids().save(&mut store).unwrap();
        assert_eq!(SessionIds::load(&store), Some(ids()));
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        {
            let mut store = LocalStore::open(&path).unwrap();
            ids().save(&mut store).unwrap();
        }
        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(SessionIds::load(&reopened), Some(ids()));
    }

    #[test]
    fn corrupt_store_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = LocalStore::open(&path).unwrap_err();
        assert!(matches!(err, ChainError::Json { .. }));
    }
}
