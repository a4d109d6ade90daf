//! Snapshot persistence: one JSON file per case.
//!
//! The snapshot is the unit of durability — saving and loading it back
//! reproduces an identical case state, derived analysis included. Writes go
//! through a temp file followed by a rename, so a crash mid-write leaves the
//! previous snapshot intact.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::APP_NAME;
use crate::error::EngineError;
use crate::models::CaseSnapshot;

pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Store rooted at an explicit directory, created if absent.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Store under the user's home directory (`~/CaseLens/cases`).
    pub fn open_default() -> Result<Self, EngineError> {
        let home = dirs::home_dir().ok_or_else(|| {
            EngineError::Configuration("cannot determine home directory".into())
        })?;
        Self::new(home.join(APP_NAME).join("cases"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, case_id: &str) -> PathBuf {
        // Case ids are caller-chosen; keep the filename safe.
        let safe: String = case_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }

    /// Persist a snapshot atomically.
    pub fn save(&self, snapshot: &CaseSnapshot) -> Result<PathBuf, EngineError> {
        let path = self.path_for(&snapshot.id);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!(case_id = %snapshot.id, path = %path.display(), "snapshot saved");
        Ok(path)
    }

    pub fn load(&self, case_id: &str) -> Result<CaseSnapshot, EngineError> {
        let path = self.path_for(case_id);
        if !path.exists() {
            return Err(EngineError::UnknownCase(case_id.to_string()));
        }
        let json = fs::read(&path)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Case ids with a stored snapshot, sorted.
    pub fn list(&self) -> Result<Vec<String>, EngineError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn delete(&self, case_id: &str) -> Result<(), EngineError> {
        let path = self.path_for(case_id);
        if !path.exists() {
            return Err(EngineError::UnknownCase(case_id.to_string()));
        }
        fs::remove_file(&path)?;
        Ok(())
    }
}
