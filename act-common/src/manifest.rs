//! Manifest store
//!
//! The manifest is the only durable cross-run state: a JSON object mapping
//! subject IDs to their ordered session records. Loading never fails hard;
//! anything malformed is coerced to an empty or partial manifest with a
//! warning. Persisting has a plain and an atomic variant.

use crate::record::SessionRecord;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Subject ID → ordered session records
pub type Manifest = BTreeMap<String, Vec<SessionRecord>>;

/// Default manifest location relative to the working directory
pub const DEFAULT_MANIFEST_PATH: &str = "res/data.json";

/// Reads and writes the manifest file at one path
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest, tolerating a missing or malformed file
    pub fn load(&self) -> Manifest {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "Manifest file not found at {}; using empty fallback payload",
                    self.path.display()
                );
                return Manifest::new();
            }
            Err(e) => {
                warn!(
                    "Unable to load manifest from {} ({}); using empty fallback payload",
                    self.path.display(),
                    e
                );
                return Manifest::new();
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(payload) => coerce_payload(payload),
            Err(e) => {
                warn!(
                    "Unable to parse manifest at {} ({}); using empty fallback payload",
                    self.path.display(),
                    e
                );
                Manifest::new()
            }
        }
    }

    /// Write the manifest in place, creating parent directories as needed
    pub fn save(&self, manifest: &Manifest) -> Result<()> {
        fs::create_dir_all(self.parent_dir())?;
        let mut file = fs::File::create(&self.path)?;
        serde_json::to_writer_pretty(&mut file, manifest)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        debug!(path = %self.path.display(), subjects = manifest.len(), "Manifest written");
        Ok(())
    }

    /// Write the manifest through a temp file and a single rename
    ///
    /// If the final replace fails the previously persisted file stays intact.
    pub fn save_atomic(&self, manifest: &Manifest) -> Result<()> {
        self.save_atomic_with(manifest, |tmp, dest| {
            tmp.persist(dest).map(|_| ()).map_err(|e| e.error)
        })
    }

    fn save_atomic_with<F>(&self, manifest: &Manifest, replace: F) -> Result<()>
    where
        F: FnOnce(NamedTempFile, &Path) -> io::Result<()>,
    {
        let dir = self.parent_dir();
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, manifest)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;

        replace(tmp, &self.path).map_err(|source| Error::AtomicWrite {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            path = %self.path.display(),
            subjects = manifest.len(),
            "Manifest written atomically"
        );
        Ok(())
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

/// Coerce an arbitrary JSON payload into a manifest
///
/// A non-object top level becomes an empty manifest, a non-array subject value
/// becomes an empty list, and records that are not objects or fail validation
/// are dropped. Each coercion logs a warning.
pub fn coerce_payload(payload: Value) -> Manifest {
    let Value::Object(subjects) = payload else {
        warn!("Manifest payload is not an object; using empty fallback payload");
        return Manifest::new();
    };

    let mut manifest = Manifest::new();
    for (subject_id, records) in subjects {
        let Value::Array(records) = records else {
            warn!(
                subject = %subject_id,
                "Manifest subject payload is not a list; coercing to empty list"
            );
            manifest.insert(subject_id, Vec::new());
            continue;
        };

        let mut normalized = Vec::with_capacity(records.len());
        for record in records {
            if !record.is_object() {
                warn!(subject = %subject_id, "Manifest subject contains non-object record; skipping record");
                continue;
            }
            match serde_json::from_value::<SessionRecord>(record) {
                Ok(record) => normalized.push(record),
                Err(e) => {
                    warn!(subject = %subject_id, "Manifest record failed validation ({}); skipping record", e);
                }
            }
        }
        manifest.insert(subject_id, normalized);
    }
    manifest
}
