//! Persistence backends for global constants
//!
//! The constant store only needs whole-table load and save, so backends
//! stay small: in-memory for tests, a null store, and a JSON file.

use crate::error::{EngineError, Result};
use notecalc_units::Value;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One constant as stored by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedConstant {
    pub value: Value,
    pub magnitude: String,
    pub unit: String,
    pub display: String,
    #[serde(default)]
    pub source_expression: Option<String>,
}

/// Table of persisted constants, keyed by name
pub type PersistedTable = BTreeMap<String, PersistedConstant>;

/// Constant storage trait
///
/// Implementations can use a settings file, in-memory storage, or nothing.
pub trait ConstantPersistence {
    /// Read every persisted constant
    fn load(&self) -> Result<PersistedTable>;

    /// Replace the persisted table
    fn save(&self, table: &PersistedTable) -> Result<()>;
}

/// In-memory persistence for testing and embedding
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    data: Mutex<PersistedTable>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: PersistedTable) -> Self {
        Self {
            data: Mutex::new(table),
        }
    }

    /// Copy of what was last saved
    pub fn contents(&self) -> PersistedTable {
        self.data.lock().clone()
    }
}

impl ConstantPersistence for MemoryPersistence {
    fn load(&self) -> Result<PersistedTable> {
        Ok(self.data.lock().clone())
    }

    fn save(&self, table: &PersistedTable) -> Result<()> {
        *self.data.lock() = table.clone();
        Ok(())
    }
}

/// Null persistence - nothing survives the process
pub struct NullPersistence;

impl ConstantPersistence for NullPersistence {
    fn load(&self) -> Result<PersistedTable> {
        Ok(PersistedTable::new())
    }

    fn save(&self, _table: &PersistedTable) -> Result<()> {
        Ok(())
    }
}

/// JSON file persistence with atomic replacement
#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}

impl ConstantPersistence for JsonFilePersistence {
    fn load(&self) -> Result<PersistedTable> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "Constants file not found, starting empty");
            return Ok(PersistedTable::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(PersistedTable::new());
        }
        serde_json::from_str(&text).map_err(|e| {
            EngineError::persistence(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn save(&self, table: &PersistedTable) -> Result<()> {
        let dir = self.directory();
        std::fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(table)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        file.persist(&self.path)
            .map_err(|e| EngineError::persistence(e.to_string()))?;

        debug!(path = %self.path.display(), count = table.len(), "Constants saved");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn sample() -> PersistedTable {
        let mut table = PersistedTable::new();
        table.insert(
            "g".to_string(),
            PersistedConstant {
                value: Value::Number(9.81),
                magnitude: "9.81".into(),
                unit: String::new(),
                display: "9.81".into(),
                source_expression: Some("9.81".into()),
            },
        );
        table
    }

    #[test]
    fn test_memory_round_trip() {
        let store = MemoryPersistence::new();
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn test_null_store_is_empty() {
        NullPersistence.save(&sample()).unwrap();
        assert!(NullPersistence.load().unwrap().is_empty());
    }

    #[test]
    fn test_json_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePersistence::new(dir.path().join("constants.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_json_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("constants.json");
        let store = JsonFilePersistence::new(&path);
        store.save(&sample()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"sourceExpression\""));
        assert_eq!(store.load().unwrap(), sample());
    }

    #[test]
    fn test_json_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constants.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFilePersistence::new(&path).load().unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
    }
}
