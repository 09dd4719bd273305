//! Copies raw drop files into their session slots
//!
//! Placement is idempotent: an occupied destination is left alone. The
//! outcome is tagged so the transaction can tell a harmless skip from a
//! failure that has to be rolled back.

use crate::fs::{remove_empty_dirs, SessionFs};
use act_common::SessionRecord;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Why a record was not copied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Raw file is not in the network drop
    SourceMissing(PathBuf),
    /// Session slot already holds a file
    DestinationExists(PathBuf),
}

/// Result of placing one record
#[derive(Debug)]
pub enum CopyOutcome {
    /// Newly written destination, plus the directories created for it
    /// (deepest first)
    Copied {
        path: PathBuf,
        created_dirs: Vec<PathBuf>,
    },
    Skipped(SkipReason),
    Failed { path: PathBuf, error: io::Error },
}

/// Places records from the network drop into the session tree
pub struct FileMover<'a> {
    fs: &'a dyn SessionFs,
    drop_dir: &'a Path,
}

impl<'a> FileMover<'a> {
    pub fn new(fs: &'a dyn SessionFs, drop_dir: &'a Path) -> Self {
        Self { fs, drop_dir }
    }

    /// Copy `<drop_dir>/<filename>` to the record's `file_path`
    pub fn place(&self, record: &SessionRecord) -> CopyOutcome {
        let source = self.drop_dir.join(&record.filename);
        let Some(destination) = record.file_path.as_deref() else {
            return CopyOutcome::Failed {
                path: source,
                error: io::Error::new(io::ErrorKind::InvalidInput, "record has no destination path"),
            };
        };

        if !self.fs.exists(&source) {
            warn!(source = %source.display(), "Source file not found; skipping");
            return CopyOutcome::Skipped(SkipReason::SourceMissing(source));
        }

        let created_dirs = self.missing_ancestors(destination);
        if let Some(parent) = created_dirs.first() {
            if let Err(error) = self.fs.create_dir_all(parent) {
                return CopyOutcome::Failed {
                    path: parent.clone(),
                    error,
                };
            }
        }

        if self.fs.exists(destination) {
            debug!(destination = %destination.display(), "File already at destination; skipping");
            return CopyOutcome::Skipped(SkipReason::DestinationExists(destination.to_path_buf()));
        }

        match self.fs.copy(&source, destination) {
            Ok(bytes) => {
                debug!(
                    source = %source.display(),
                    destination = %destination.display(),
                    bytes,
                    "Copied"
                );
                CopyOutcome::Copied {
                    path: destination.to_path_buf(),
                    created_dirs,
                }
            }
            Err(error) => {
                // Leave no empty session slot behind
                for (dir, e) in remove_empty_dirs(self.fs, &created_dirs) {
                    warn!(error = %e, "Could not remove empty session directory {}", dir.display());
                }
                CopyOutcome::Failed {
                    path: destination.to_path_buf(),
                    error,
                }
            }
        }
    }

    /// Ancestors of `destination` that do not exist yet, deepest first
    fn missing_ancestors(&self, destination: &Path) -> Vec<PathBuf> {
        destination
            .ancestors()
            .skip(1)
            .filter(|p| !p.as_os_str().is_empty())
            .take_while(|p| !self.fs.exists(p))
            .map(Path::to_path_buf)
            .collect()
    }
}
