//! Registry boundary
//!
//! The registry maps lab identities to study subject identities. The engine
//! only consumes `{subject_id, lab_id}` rows; [`RegistrySnapshot`] reads them
//! from an exported JSON array.

use crate::error::{IngestError, IngestResult};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use tracing::info;

/// One subject ↔ lab binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub struct RegistryRow {
    #[serde(alias = "boost_id", deserialize_with = "id_string")]
    pub subject_id: String,
    #[serde(deserialize_with = "id_string")]
    pub lab_id: String,
}

impl RegistryRow {
    pub fn new(subject_id: impl Into<String>, lab_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            lab_id: lab_id.into(),
        }
    }
}

/// Source of subject ↔ lab bindings
pub trait Registry {
    fn subject_lab_rows(&self) -> IngestResult<Vec<RegistryRow>>;
}

/// Registry rows held in memory
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    rows: Vec<RegistryRow>,
}

impl RegistrySnapshot {
    pub fn from_rows(rows: Vec<RegistryRow>) -> Self {
        Self { rows }
    }

    /// Load an exported JSON array of `{subject_id, lab_id}` objects
    pub fn load(path: &Path) -> IngestResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Registry(format!("read {} failed: {}", path.display(), e))
        })?;
        let rows: Vec<RegistryRow> = serde_json::from_str(&content).map_err(|e| {
            IngestError::Registry(format!("parse {} failed: {}", path.display(), e))
        })?;
        info!("Loaded {} registry rows from {}", rows.len(), path.display());
        Ok(Self { rows })
    }
}

impl Registry for RegistrySnapshot {
    fn subject_lab_rows(&self) -> IngestResult<Vec<RegistryRow>> {
        Ok(self.rows.clone())
    }
}

/// Registry exports carry IDs as numbers or strings
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(text) => Ok(text.trim().to_string()),
        RawId::Number(n) => Ok(n.to_string()),
    }
}
