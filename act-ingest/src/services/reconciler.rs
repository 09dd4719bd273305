//! Run assignment for one subject
//!
//! Existing manifest records and incoming matches are merged by identity
//! key, sorted by `(date, filename, labID)` and numbered from 1. The result
//! is the canonical target state the rest of the transaction moves disk
//! toward. Two distinct acquisitions on the same calendar date cannot be
//! ordered, so the subject is skipped instead.

use crate::layout::SessionLayout;
use act_common::{IdentityKey, SessionRecord, Study};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

/// Audit classification of a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Every new file is dated after every existing one
    AppendLatest,
    /// New files land before existing ones, or runs were renumbered
    BackfillReindex,
    /// Nothing new and nothing renumbered
    NoopDuplicate,
}

impl ReconcileAction {
    /// Machine-parseable log tag
    pub fn tag(&self) -> &'static str {
        match self {
            ReconcileAction::AppendLatest => "append_latest",
            ReconcileAction::BackfillReindex => "backfill_reindex",
            ReconcileAction::NoopDuplicate => "noop_duplicate",
        }
    }
}

/// Two merged records share a normalized date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieDateConflict {
    pub date: NaiveDate,
}

/// Canonical state for one subject
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Merged records in run order, each with run, study and file path set
    pub canonical: Vec<SessionRecord>,
    /// Incoming identity keys absent from the existing records
    pub new_keys: BTreeSet<IdentityKey>,
    pub action: ReconcileAction,
}

impl Reconciliation {
    /// Canonical records that correspond to the incoming batch
    pub fn committed_subset(&self, incoming: &[SessionRecord]) -> Vec<SessionRecord> {
        let keys: HashSet<IdentityKey> = incoming.iter().map(|r| r.identity_key()).collect();
        self.canonical
            .iter()
            .filter(|r| keys.contains(&r.identity_key()))
            .cloned()
            .collect()
    }

    /// Canonical records that still have to be copied into place
    pub fn new_records(&self) -> impl Iterator<Item = &SessionRecord> {
        self.canonical
            .iter()
            .filter(|r| self.new_keys.contains(&r.identity_key()))
    }
}

/// Merge two record lists by identity key
///
/// The first record seen for a key wins, existing before incoming, so an
/// exact duplicate never displaces the stored record.
pub fn merge_records(existing: &[SessionRecord], incoming: &[SessionRecord]) -> Vec<SessionRecord> {
    let mut seen = HashSet::new();
    existing
        .iter()
        .chain(incoming.iter())
        .filter(|record| seen.insert(record.identity_key()))
        .cloned()
        .collect()
}

/// First date carried by more than one record
pub fn find_tie_date(records: &[SessionRecord]) -> Option<NaiveDate> {
    let mut seen = HashSet::new();
    records.iter().map(|r| r.date).find(|date| !seen.insert(*date))
}

/// Compute the canonical run numbering for one subject
pub fn reconcile(
    subject_id: &str,
    study: Study,
    layout: &SessionLayout,
    existing: &[SessionRecord],
    incoming: &[SessionRecord],
) -> Result<Reconciliation, TieDateConflict> {
    let mut merged = merge_records(existing, incoming);

    if let Some(date) = find_tie_date(&merged) {
        warn!(
            subject = %subject_id,
            action = "skip_tie_date",
            date = %date,
            "skip_tie_date subject={}",
            subject_id
        );
        return Err(TieDateConflict { date });
    }

    merged.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let canonical: Vec<SessionRecord> = merged
        .into_iter()
        .zip(1u32..)
        .map(|(record, run)| {
            let path = layout.session_file(study, subject_id, run);
            record.with_run(run).with_study(study).with_file_path(path)
        })
        .collect();

    let existing_keys: HashSet<IdentityKey> = existing.iter().map(|r| r.identity_key()).collect();
    let new_keys: BTreeSet<IdentityKey> = incoming
        .iter()
        .map(|r| r.identity_key())
        .filter(|key| !existing_keys.contains(key))
        .collect();

    let action = classify(existing, &canonical, &new_keys);
    info!(
        subject = %subject_id,
        action = action.tag(),
        new = new_keys.len(),
        total = canonical.len(),
        "{} subject={}",
        action.tag(),
        subject_id
    );

    Ok(Reconciliation {
        canonical,
        new_keys,
        action,
    })
}

fn classify(
    existing: &[SessionRecord],
    canonical: &[SessionRecord],
    new_keys: &BTreeSet<IdentityKey>,
) -> ReconcileAction {
    if new_keys.is_empty() {
        let renumbered = existing.iter().any(|old| {
            canonical
                .iter()
                .find(|c| c.identity_key() == old.identity_key())
                .map_or(false, |c| c.run != old.run)
        });
        return if renumbered {
            ReconcileAction::BackfillReindex
        } else {
            ReconcileAction::NoopDuplicate
        };
    }

    let latest_existing = existing.iter().map(|r| r.date).max();
    let earliest_new = new_keys.iter().map(|k| k.date).min();
    match (latest_existing, earliest_new) {
        (Some(old), Some(new)) if new <= old => ReconcileAction::BackfillReindex,
        _ => ReconcileAction::AppendLatest,
    }
}
