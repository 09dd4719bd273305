//! Per-subject transaction
//!
//! One subject at a time: reconcile, renumber on disk, copy new files, and
//! only then replace the subject's manifest entry. Any failure after the
//! first disk mutation removes the copies and replays the inverse rename
//! plan, leaving the manifest entry exactly as it was.

use crate::error::{IngestError, IngestResult};
use crate::fs::{remove_empty_dirs, SessionFs};
use crate::layout::SessionLayout;
use crate::services::file_mover::{CopyOutcome, FileMover, SkipReason};
use crate::services::reconciler::{reconcile, Reconciliation};
use crate::services::rename_planner::{plan_renames, RenamePlan};
use crate::services::session_linker::refresh_subject_links;
use crate::services::two_phase_mover::{MoveReport, TwoPhaseMover};
use crate::temp_names::TempNameAllocator;
use act_common::record::CohortRanges;
use act_common::{Manifest, SessionRecord, Study};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// How one subject's transaction ended
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    /// Canonical records matching the incoming batch
    Committed(Vec<SessionRecord>),
    /// Two acquisitions share a date; nothing was touched
    SkippedTieDate,
    /// Rolled back; the reason is logged under `rename_failed`
    Failed(String),
}

impl TransactionOutcome {
    /// Committed records, empty for every other outcome
    pub fn committed(&self) -> &[SessionRecord] {
        match self {
            TransactionOutcome::Committed(records) => records,
            _ => &[],
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, TransactionOutcome::Committed(_))
    }
}

/// Disk changes made so far, for rollback
#[derive(Debug, Default)]
struct Applied {
    moves: MoveReport,
    copied: Vec<PathBuf>,
    created_dirs: Vec<PathBuf>,
}

/// Runs subject transactions against one session tree
pub struct TransactionCoordinator<'a> {
    layout: &'a SessionLayout,
    fs: &'a dyn SessionFs,
    names: &'a dyn TempNameAllocator,
    drop_dir: &'a Path,
    cohorts: CohortRanges,
    link_sessions: bool,
}

impl<'a> TransactionCoordinator<'a> {
    pub fn new(
        layout: &'a SessionLayout,
        fs: &'a dyn SessionFs,
        names: &'a dyn TempNameAllocator,
        drop_dir: &'a Path,
    ) -> Self {
        Self {
            layout,
            fs,
            names,
            drop_dir,
            cohorts: CohortRanges::default(),
            link_sessions: false,
        }
    }

    pub fn with_cohorts(mut self, cohorts: CohortRanges) -> Self {
        self.cohorts = cohorts;
        self
    }

    pub fn with_link_sessions(mut self, enabled: bool) -> Self {
        self.link_sessions = enabled;
        self
    }

    /// Bring one subject's tree and manifest entry to canonical state
    ///
    /// `manifest` is only modified on `Committed`.
    pub fn process_subject(
        &self,
        manifest: &mut Manifest,
        subject_id: &str,
        incoming: &[SessionRecord],
    ) -> TransactionOutcome {
        let existing: &[SessionRecord] = manifest.get(subject_id).map(Vec::as_slice).unwrap_or(&[]);

        let Some(study) = self.resolve_study(subject_id, incoming, existing) else {
            let reason = IngestError::UnknownCohort(subject_id.to_string()).to_string();
            error!(subject = %subject_id, "{}", reason);
            return TransactionOutcome::Failed(reason);
        };

        let reconciliation = match reconcile(subject_id, study, self.layout, existing, incoming) {
            Ok(reconciliation) => reconciliation,
            Err(_) => return TransactionOutcome::SkippedTieDate,
        };

        let plan = plan_renames(subject_id, study, self.layout, existing, &reconciliation.canonical);
        let mut applied = Applied::default();

        if let Err(e) = self.apply(&plan, &reconciliation, &mut applied) {
            error!(
                subject = %subject_id,
                action = "rename_failed",
                error = %e,
                "rename_failed subject={} error={}",
                subject_id,
                e
            );
            self.roll_back(&plan, &applied);
            return TransactionOutcome::Failed(e.to_string());
        }

        let committed = reconciliation.committed_subset(incoming);
        manifest.insert(subject_id.to_string(), reconciliation.canonical);

        if self.link_sessions {
            let accel_dir = self.layout.accel_dir(study, subject_id);
            if let Err(e) = refresh_subject_links(&accel_dir) {
                warn!(subject = %subject_id, error = %e, "Session link refresh failed");
            }
        }

        TransactionOutcome::Committed(committed)
    }

    /// Incoming hint, then stored study, then the subject-ID range
    fn resolve_study(
        &self,
        subject_id: &str,
        incoming: &[SessionRecord],
        existing: &[SessionRecord],
    ) -> Option<Study> {
        incoming
            .iter()
            .chain(existing.iter())
            .find_map(|r| r.study)
            .or_else(|| Study::for_subject(subject_id, &self.cohorts))
    }

    fn apply(
        &self,
        plan: &RenamePlan,
        reconciliation: &Reconciliation,
        applied: &mut Applied,
    ) -> IngestResult<()> {
        applied.moves = TwoPhaseMover::new(self.fs, self.names).apply(plan)?;

        let mover = FileMover::new(self.fs, self.drop_dir);
        for record in reconciliation.new_records() {
            match mover.place(record) {
                CopyOutcome::Copied { path, created_dirs } => {
                    applied.copied.push(path);
                    applied.created_dirs.extend(created_dirs);
                }
                CopyOutcome::Skipped(SkipReason::SourceMissing(source)) => {
                    warn!(
                        subject = %plan.subject_id,
                        source = %source.display(),
                        "New record has no source file in the drop"
                    );
                }
                CopyOutcome::Skipped(SkipReason::DestinationExists(_)) => {}
                CopyOutcome::Failed { path, error } => {
                    return Err(IngestError::Copy {
                        path,
                        source: error,
                    });
                }
            }
        }
        Ok(())
    }

    fn roll_back(&self, plan: &RenamePlan, applied: &Applied) {
        for path in &applied.copied {
            if !self.fs.exists(path) {
                continue;
            }
            if let Err(e) = self.fs.remove_file(path) {
                warn!(subject = %plan.subject_id, error = %e, "Could not remove {}", path.display());
            }
        }

        // Slots created for copies must be gone before directories move back
        for (dir, e) in remove_empty_dirs(self.fs, &applied.created_dirs) {
            warn!(subject = %plan.subject_id, error = %e, "Could not remove {}", dir.display());
        }

        if applied.moves.moved > 0 {
            let rollback = applied.moves.rollback_plan(plan);
            if let Err(e) = TwoPhaseMover::new(self.fs, self.names).apply(&rollback) {
                warn!(
                    subject = %plan.subject_id,
                    action = "rename_failed",
                    "rename_failed subject={} rollback_error={}",
                    plan.subject_id,
                    e
                );
            }
        }
        debug!(subject = %plan.subject_id, removed = applied.copied.len(), "Transaction rolled back");
    }
}
