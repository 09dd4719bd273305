//! End-to-end ingest run
//!
//! Load the manifest, match drop files to subjects, resolve duplicate
//! identities, run one transaction per subject in ascending subject order,
//! then persist the manifest atomically. A subject that fails is reported
//! and left at its pre-run state; the others still commit.

use crate::drop_listing::DropRow;
use crate::error::IngestResult;
use crate::fs::{SessionFs, StdFs};
use crate::layout::SessionLayout;
use crate::registry::Registry;
use crate::services::duplicate_resolver::DuplicateResolver;
use crate::services::identity_matcher::match_identities;
use crate::services::manifest_rebuilder::ManifestRebuilder;
use crate::services::session_linker::remove_link_directories;
use crate::services::transaction::{TransactionCoordinator, TransactionOutcome};
use crate::temp_names::{CounterAllocator, TempNameAllocator};
use act_common::config::{IngestConfig, SystemPaths};
use act_common::record::CohortRanges;
use act_common::{Manifest, ManifestStore, SessionRecord};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Run-wide knobs taken from [`IngestConfig`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    pub excluded_subjects: BTreeSet<String>,
    pub cohorts: CohortRanges,
    pub link_sessions: bool,
}

impl PipelineSettings {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            excluded_subjects: config.excluded_subjects.clone(),
            cohorts: config.cohorts,
            link_sessions: config.link_sessions,
        }
    }
}

/// Per-run transaction counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub committed: usize,
    pub skipped_tie_date: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &TransactionOutcome) {
        match outcome {
            TransactionOutcome::Committed(_) => self.committed += 1,
            TransactionOutcome::SkippedTieDate => self.skipped_tie_date += 1,
            TransactionOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// What one [`IngestPipeline::run`] committed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Subject → committed records; empty for subjects that did not commit
    pub committed: BTreeMap<String, Vec<SessionRecord>>,
    pub summary: RunSummary,
}

/// Ingest engine bound to one system profile and manifest
pub struct IngestPipeline {
    paths: SystemPaths,
    layout: SessionLayout,
    settings: PipelineSettings,
    store: ManifestStore,
    fs: Box<dyn SessionFs>,
    names: Box<dyn TempNameAllocator>,
}

impl IngestPipeline {
    pub fn new(paths: SystemPaths, settings: PipelineSettings, store: ManifestStore) -> Self {
        let layout = SessionLayout::from_paths(&paths);
        Self {
            paths,
            layout,
            settings,
            store,
            fs: Box::new(StdFs),
            names: Box::new(CounterAllocator),
        }
    }

    /// Replace the filesystem used for session moves and copies
    pub fn with_fs(mut self, fs: Box<dyn SessionFs>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_temp_names(mut self, names: Box<dyn TempNameAllocator>) -> Self {
        self.names = names;
        self
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    /// Ingest `drop_rows` for every subject the registry knows
    pub fn run(&self, registry: &dyn Registry, drop_rows: &[DropRow]) -> IngestResult<IngestReport> {
        let drop_dir = self.paths.require_drop_dir()?;

        if !self.settings.link_sessions {
            remove_link_directories(&self.paths.study_roots());
        }

        let rows = registry.subject_lab_rows()?;
        let mut manifest = self.store.load();

        let matched = match_identities(&rows, drop_rows);
        let mut batches = matched.matches;
        let resolver = DuplicateResolver::new(
            self.fs.as_ref(),
            &self.layout,
            self.settings.cohorts,
            &self.settings.excluded_subjects,
        );
        for (subject, records) in resolver.resolve_all(&matched.duplicates, &manifest) {
            batches.entry(subject).or_default().extend(records);
        }

        let coordinator = TransactionCoordinator::new(
            &self.layout,
            self.fs.as_ref(),
            self.names.as_ref(),
            drop_dir,
        )
        .with_cohorts(self.settings.cohorts)
        .with_link_sessions(self.settings.link_sessions);

        let mut report = IngestReport::default();
        for (subject, incoming) in &batches {
            let outcome = coordinator.process_subject(&mut manifest, subject, incoming);
            report.summary.record(&outcome);
            report
                .committed
                .insert(subject.clone(), outcome.committed().to_vec());
        }

        self.store.save_atomic(&manifest)?;

        info!(
            subjects = batches.len(),
            committed = report.summary.committed,
            skipped = report.summary.skipped_tie_date,
            failed = report.summary.failed,
            manifest = %self.store.path().display(),
            "Ingest run complete"
        );
        Ok(report)
    }

    /// Rebuild the manifest from disk and persist it only on a clean pass
    pub fn rebuild_manifest(
        &self,
        registry: &dyn Registry,
        drop_rows: &[DropRow],
    ) -> IngestResult<Manifest> {
        let rows = registry.subject_lab_rows()?;
        let manifest = ManifestRebuilder::new(&self.layout).rebuild(&rows, drop_rows)?;
        self.store.save_atomic(&manifest)?;
        info!(
            subjects = manifest.len(),
            manifest = %self.store.path().display(),
            "Rebuilt manifest written"
        );
        Ok(manifest)
    }
}
