//! Duplicate-identity resolution
//!
//! A participant enrolled first in the observational study and later in the
//! interventional one keeps a single lab ID but gets two subject IDs. Their
//! files are split: the earliest goes to the observational subject's first
//! session if that slot is free, everything else to the interventional
//! subject's next free sessions.

use crate::error::{IngestError, IngestResult};
use crate::fs::SessionFs;
use crate::layout::{parse_session_dir, SessionLayout};
use act_common::record::CohortRanges;
use act_common::{Manifest, SessionRecord, Study};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, error, info};

/// One subject's side of a duplicate group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub subject_id: String,
    /// `(filename, date)` pairs seen for this subject
    pub files: Vec<(String, NaiveDate)>,
}

/// One lab ID bound to several subject IDs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub lab_id: String,
    pub entries: Vec<DuplicateEntry>,
}

/// Splits duplicate groups between the two cohorts
pub struct DuplicateResolver<'a> {
    fs: &'a dyn SessionFs,
    layout: &'a SessionLayout,
    cohorts: CohortRanges,
    excluded: &'a BTreeSet<String>,
}

impl<'a> DuplicateResolver<'a> {
    pub fn new(
        fs: &'a dyn SessionFs,
        layout: &'a SessionLayout,
        cohorts: CohortRanges,
        excluded: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            fs,
            layout,
            cohorts,
            excluded,
        }
    }

    /// Assign every file of `group` to a `(subject, record)` slot
    ///
    /// Files already stored under either subject stay there. Runs, studies
    /// and paths on the returned records are placement hints.
    pub fn resolve(
        &self,
        group: &DuplicateGroup,
        manifest: &Manifest,
    ) -> IngestResult<Vec<(String, SessionRecord)>> {
        let (obs_id, int_id) = self.pick_subjects(group)?;

        let mut combined: Vec<(String, NaiveDate)> = Vec::new();
        let mut seen = HashSet::new();
        for entry in &group.entries {
            for file in &entry.files {
                if seen.insert(file.clone()) {
                    combined.push(file.clone());
                }
            }
        }
        combined.sort_by(|a, b| (a.1, &a.0).cmp(&(b.1, &b.0)));

        let stored_obs = stored_files(manifest, obs_id);
        let stored_int = stored_files(manifest, int_id);

        let mut obs_occupied = !stored_obs.is_empty() || self.obs_first_slot_occupied(obs_id);
        let mut next_int = self.next_free_session(int_id)?;

        let mut assigned = Vec::with_capacity(combined.len());
        for (filename, date) in combined {
            let key = (filename.clone(), date);
            let (subject, study, run) = if stored_obs.contains(&key) {
                (obs_id, Study::Obs, None)
            } else if stored_int.contains(&key) {
                (int_id, Study::Int, None)
            } else if !obs_occupied {
                obs_occupied = true;
                (obs_id, Study::Obs, Some(1))
            } else {
                let run = next_int;
                next_int += 1;
                (int_id, Study::Int, Some(run))
            };

            let mut record = SessionRecord {
                filename,
                lab_id: group.lab_id.clone(),
                date,
                run: None,
                study: None,
                file_path: None,
            }
            .with_study(study);
            if let Some(run) = run {
                record = record
                    .with_run(run)
                    .with_file_path(self.layout.session_file(study, subject, run));
            }
            assigned.push((subject.to_string(), record));
        }

        info!(
            lab_id = %group.lab_id,
            obs = %obs_id,
            int = %int_id,
            files = assigned.len(),
            "Duplicate group resolved"
        );
        Ok(assigned)
    }

    /// Resolve every group, merging the results by subject
    ///
    /// A group that cannot be resolved is logged and left out.
    pub fn resolve_all(
        &self,
        groups: &[DuplicateGroup],
        manifest: &Manifest,
    ) -> BTreeMap<String, Vec<SessionRecord>> {
        let mut merged: BTreeMap<String, Vec<SessionRecord>> = BTreeMap::new();
        for group in groups {
            match self.resolve(group, manifest) {
                Ok(assigned) => {
                    for (subject, record) in assigned {
                        merged.entry(subject).or_default().push(record);
                    }
                }
                Err(e) => error!(lab_id = %group.lab_id, "{}", e),
            }
        }
        merged
    }

    fn pick_subjects<'g>(&self, group: &'g DuplicateGroup) -> IngestResult<(&'g str, &'g str)> {
        let mut obs = None;
        let mut int = None;
        for entry in &group.entries {
            let id = entry.subject_id.as_str();
            if self.excluded.contains(id) {
                debug!(lab_id = %group.lab_id, subject = %id, "Excluded subject ignored");
                continue;
            }
            let slot = match Study::for_subject(id, &self.cohorts) {
                Some(Study::Obs) => &mut obs,
                Some(Study::Int) => &mut int,
                None => return Err(group_error(group, format!("subject {} has no cohort", id))),
            };
            if let Some(previous) = slot.replace(id) {
                return Err(group_error(
                    group,
                    format!("subjects {} and {} share one cohort", previous, id),
                ));
            }
        }

        let obs = obs.ok_or_else(|| group_error(group, "missing observational subject".into()))?;
        let int = int.ok_or_else(|| group_error(group, "missing interventional subject".into()))?;
        Ok((obs, int))
    }

    fn obs_first_slot_occupied(&self, obs_id: &str) -> bool {
        let dir = self.layout.session_dir(Study::Obs, obs_id, 1);
        matches!(crate::fs::find_accel_csv(self.fs, &dir), Ok(Some(_)))
    }

    /// One past the highest `ses-N` under the interventional subject
    fn next_free_session(&self, int_id: &str) -> IngestResult<u32> {
        let accel = self.layout.accel_dir(Study::Int, int_id);
        if !self.fs.exists(&accel) {
            return Ok(1);
        }
        let highest = self
            .fs
            .read_dir_names(&accel)?
            .iter()
            .filter_map(|name| parse_session_dir(name))
            .max()
            .unwrap_or(0);
        Ok(highest + 1)
    }
}

fn stored_files(manifest: &Manifest, subject_id: &str) -> HashSet<(String, NaiveDate)> {
    manifest
        .get(subject_id)
        .into_iter()
        .flatten()
        .map(|r| (r.filename.clone(), r.date))
        .collect()
}

fn group_error(group: &DuplicateGroup, reason: String) -> IngestError {
    IngestError::DuplicateGroup {
        lab_id: group.lab_id.clone(),
        reason,
    }
}
