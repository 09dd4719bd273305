//! Manifest reconstruction from the session tree
//!
//! Disaster recovery: the on-disk tree is treated as the truth, the registry
//! supplies each subject's lab ID and the drop listing supplies filename and
//! date for each discovered session. The rebuild is all-or-nothing; one
//! ambiguous or unresolvable subject rejects the whole result.

use crate::drop_listing::DropRow;
use crate::error::{RebuildError, RebuildFailure};
use crate::layout::{is_accel_csv, parse_session_dir, parse_subject_dir, SessionLayout, ACCEL_DIR};
use crate::registry::RegistryRow;
use act_common::{Manifest, SessionRecord, Study};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One `ses-N` directory holding exactly one accel CSV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSession {
    pub subject_id: String,
    pub study: Study,
    pub run: u32,
    pub csv_path: PathBuf,
}

/// Result of walking both study roots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Sessions of conflict-free subjects, ordered by subject then run
    pub sessions: Vec<DiscoveredSession>,
    pub conflicts: Vec<RebuildFailure>,
}

/// Walk both study roots for canonical session files
pub fn discover_sessions(layout: &SessionLayout) -> Discovery {
    let mut by_subject: BTreeMap<String, Vec<(Study, Vec<DiscoveredSession>)>> = BTreeMap::new();
    let mut conflicted: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (study, root) in layout.roots() {
        for subject_dir in child_dirs(root) {
            let Some(subject_id) = dir_name(&subject_dir).and_then(parse_subject_dir).map(String::from) else {
                continue;
            };

            let mut sessions = Vec::new();
            for session_dir in child_dirs(&subject_dir.join(ACCEL_DIR)) {
                let Some(run) = dir_name(&session_dir).and_then(parse_session_dir) else {
                    continue;
                };
                let candidates = accel_csvs(&session_dir);
                match candidates.as_slice() {
                    [] => warn!(
                        subject = %subject_id,
                        dir = %session_dir.display(),
                        "Session directory has no accel csv; skipping"
                    ),
                    [csv] => sessions.push(DiscoveredSession {
                        subject_id: subject_id.clone(),
                        study,
                        run,
                        csv_path: csv.clone(),
                    }),
                    _ => conflicted.entry(subject_id.clone()).or_default().push(format!(
                        "multiple accel csv candidates in ses-{}",
                        run
                    )),
                }
            }
            sessions.sort_by_key(|s| s.run);
            by_subject.entry(subject_id).or_default().push((study, sessions));
        }
    }

    let mut discovery = Discovery::default();
    for (subject_id, trees) in by_subject {
        if trees.len() > 1 {
            conflicted
                .entry(subject_id.clone())
                .or_default()
                .push("present in both int and obs trees".to_string());
        }
        if let Some(details) = conflicted.remove(&subject_id) {
            for detail in details {
                discovery.conflicts.push(RebuildFailure::Conflict {
                    subject_id: subject_id.clone(),
                    detail,
                });
            }
            continue;
        }
        for (_, sessions) in trees {
            discovery.sessions.extend(sessions);
        }
    }

    debug!(
        sessions = discovery.sessions.len(),
        conflicts = discovery.conflicts.len(),
        "Session discovery complete"
    );
    discovery
}

/// Rebuilds a manifest from disk, registry rows and the drop listing
pub struct ManifestRebuilder<'a> {
    layout: &'a SessionLayout,
}

impl<'a> ManifestRebuilder<'a> {
    pub fn new(layout: &'a SessionLayout) -> Self {
        Self { layout }
    }

    /// Reconstruct the manifest, or report every failing subject
    pub fn rebuild(
        &self,
        registry_rows: &[RegistryRow],
        drop_rows: &[DropRow],
    ) -> Result<Manifest, RebuildError> {
        let discovery = discover_sessions(self.layout);
        let mut failures = discovery.conflicts;

        let mut labs_by_subject: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for row in registry_rows {
            labs_by_subject
                .entry(row.subject_id.as_str())
                .or_default()
                .insert(row.lab_id.as_str());
        }

        // labID -> subject -> sessions
        let mut by_lab: BTreeMap<String, BTreeMap<String, Vec<&DiscoveredSession>>> = BTreeMap::new();
        let mut reported = BTreeSet::new();
        for session in &discovery.sessions {
            let subject = session.subject_id.as_str();
            let labs = labs_by_subject.get(&subject);
            match labs.map(|l| l.len()).unwrap_or(0) {
                1 => {
                    if let Some(lab) = labs.and_then(|l| l.iter().next()) {
                        by_lab
                            .entry(lab.to_string())
                            .or_default()
                            .entry(subject.to_string())
                            .or_default()
                            .push(session);
                    }
                }
                0 => {
                    if reported.insert(subject) {
                        failures.push(RebuildFailure::MissingLabMapping {
                            subject_id: subject.to_string(),
                        });
                    }
                }
                _ => {
                    if reported.insert(subject) {
                        failures.push(RebuildFailure::AmbiguousLabMapping {
                            subject_id: subject.to_string(),
                            lab_ids: labs
                                .map(|l| l.iter().map(|s| s.to_string()).collect())
                                .unwrap_or_default(),
                        });
                    }
                }
            }
        }

        let mut drops_by_lab: BTreeMap<&str, Vec<&DropRow>> = BTreeMap::new();
        for row in drop_rows {
            drops_by_lab.entry(row.lab_id.as_str()).or_default().push(row);
        }
        for rows in drops_by_lab.values_mut() {
            rows.sort_by(|a, b| (a.date, &a.filename).cmp(&(b.date, &b.filename)));
        }

        let mut manifest = Manifest::new();
        for (lab_id, subjects) in &by_lab {
            let mut ordered: Vec<(&String, &Vec<&DiscoveredSession>)> = subjects.iter().collect();
            ordered.sort_by(|a, b| {
                (study_rank(a.1), a.0.as_str()).cmp(&(study_rank(b.1), b.0.as_str()))
            });

            let mut rows = drops_by_lab
                .get(&lab_id.as_str())
                .map(|rows| rows.iter())
                .into_iter()
                .flatten();
            for (subject, sessions) in ordered {
                let mut records = Vec::with_capacity(sessions.len());
                for session in sessions {
                    match rows.next() {
                        Some(row) => records.push(record_for(row, session)),
                        None => failures.push(RebuildFailure::UnresolvedRun {
                            subject_id: subject.clone(),
                            run: session.run,
                            lab_id: lab_id.clone(),
                        }),
                    }
                }
                manifest.insert(subject.clone(), records);
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                warn!(subject = %failure.subject_id(), "Rebuild failure: {}", failure);
            }
            return Err(RebuildError { failures });
        }

        info!(subjects = manifest.len(), "Manifest rebuilt from session tree");
        Ok(manifest)
    }
}

fn child_dirs(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect()
}

fn accel_csvs(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && is_accel_csv(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect()
}

/// Observational subjects consume a shared lab's earliest rows
fn study_rank(sessions: &[&DiscoveredSession]) -> u8 {
    match sessions.first().map(|s| s.study) {
        Some(Study::Obs) => 0,
        _ => 1,
    }
}

fn dir_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn record_for(row: &DropRow, session: &DiscoveredSession) -> SessionRecord {
    row.to_record()
        .with_run(session.run)
        .with_study(session.study)
        .with_file_path(session.csv_path.clone())
}
