//! Error types for act-ingest
//!
//! Subject-level failures (a failed move or copy) are reported through
//! [`IngestError`] and end one subject's transaction. A rejected manifest
//! rebuild is a [`RebuildError`] carrying every failing subject at once.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Ingest engine error type
#[derive(Debug, Error)]
pub enum IngestError {
    /// Filesystem step failed during a two-phase move
    #[error("{step} failed for {}: {source}", .path.display())]
    Move {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Copying a source file into its session slot failed
    #[error("copy to {} failed: {source}", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A duplicate-identity group could not be resolved
    #[error("duplicate group labID={lab_id}: {reason}")]
    DuplicateGroup { lab_id: String, reason: String },

    /// Subject ID does not fall into any cohort range
    #[error("no cohort can be derived for subject {0}")]
    UnknownCohort(String),

    /// Registry snapshot could not be read
    #[error("registry error: {0}")]
    Registry(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest rebuild rejected
    #[error(transparent)]
    Rebuild(#[from] RebuildError),

    /// act-common error
    #[error("Common error: {0}")]
    Common(#[from] act_common::Error),
}

/// Result type for ingest operations
pub type IngestResult<T> = Result<T, IngestError>;

/// One reason a subject blocks a manifest rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildFailure {
    /// On-disk layout for the subject is ambiguous
    Conflict { subject_id: String, detail: String },
    /// Registry has no lab ID for the subject
    MissingLabMapping { subject_id: String },
    /// Registry binds the subject to several lab IDs
    AmbiguousLabMapping {
        subject_id: String,
        lab_ids: Vec<String>,
    },
    /// No drop-listing row is left for a discovered run
    UnresolvedRun {
        subject_id: String,
        run: u32,
        lab_id: String,
    },
}

impl RebuildFailure {
    pub fn subject_id(&self) -> &str {
        match self {
            RebuildFailure::Conflict { subject_id, .. }
            | RebuildFailure::MissingLabMapping { subject_id }
            | RebuildFailure::AmbiguousLabMapping { subject_id, .. }
            | RebuildFailure::UnresolvedRun { subject_id, .. } => subject_id,
        }
    }
}

impl fmt::Display for RebuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildFailure::Conflict { subject_id, detail } => {
                write!(f, "subject={} conflict: {}", subject_id, detail)
            }
            RebuildFailure::MissingLabMapping { subject_id } => {
                write!(f, "subject={} missing registry lab mapping", subject_id)
            }
            RebuildFailure::AmbiguousLabMapping {
                subject_id,
                lab_ids,
            } => write!(
                f,
                "subject={} mapped to multiple labIDs: {}",
                subject_id,
                lab_ids.join(", ")
            ),
            RebuildFailure::UnresolvedRun {
                subject_id,
                run,
                lab_id,
            } => write!(
                f,
                "subject={} run={} labID={} has no matching drop-listing row",
                subject_id, run, lab_id
            ),
        }
    }
}

/// A manifest rebuild that found at least one conflict or strict failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("manifest rebuild rejected:\n{}", render_failures(.failures))]
pub struct RebuildError {
    pub failures: Vec<RebuildFailure>,
}

fn render_failures(failures: &[RebuildFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("  - {}", failure))
        .collect::<Vec<_>>()
        .join("\n")
}
