//! Registry × drop join
//!
//! Every registry binding with drop files becomes a batch of fresh records
//! for its subject. A lab bound to several subjects is set aside as a
//! duplicate-identity group; a subject bound to several labs is dropped.

use crate::drop_listing::DropRow;
use crate::registry::RegistryRow;
use crate::services::duplicate_resolver::{DuplicateEntry, DuplicateGroup};
use act_common::SessionRecord;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error};

/// Output of [`match_identities`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    /// Subject ID → fresh records, in drop order
    pub matches: BTreeMap<String, Vec<SessionRecord>>,
    pub duplicates: Vec<DuplicateGroup>,
}

/// Join registry rows with drop rows by lab ID
pub fn match_identities(rows: &[RegistryRow], drops: &[DropRow]) -> MatchResult {
    let mut labs_by_subject: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for row in rows {
        if row.subject_id.is_empty() || row.lab_id.is_empty() {
            continue;
        }
        labs_by_subject
            .entry(row.subject_id.as_str())
            .or_default()
            .insert(row.lab_id.as_str());
    }

    let mut subjects_by_lab: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (subject, labs) in &labs_by_subject {
        if labs.len() > 1 {
            error!(
                subject = %subject,
                "Subject bound to multiple labIDs ({}); skipping",
                labs.iter().copied().collect::<Vec<_>>().join(", ")
            );
            continue;
        }
        for lab in labs {
            subjects_by_lab.entry(*lab).or_default().insert(*subject);
        }
    }

    let mut drops_by_lab: BTreeMap<&str, Vec<&DropRow>> = BTreeMap::new();
    for drop in drops {
        drops_by_lab.entry(drop.lab_id.as_str()).or_default().push(drop);
    }

    let mut result = MatchResult::default();
    for (lab, subjects) in subjects_by_lab {
        let Some(files) = drops_by_lab.get(&lab) else {
            continue;
        };

        if subjects.len() > 1 {
            debug!(lab_id = %lab, subjects = subjects.len(), "Duplicate identity group");
            let files: Vec<_> = files.iter().map(|d| (d.filename.clone(), d.date)).collect();
            result.duplicates.push(DuplicateGroup {
                lab_id: lab.to_string(),
                entries: subjects
                    .iter()
                    .map(|subject| DuplicateEntry {
                        subject_id: subject.to_string(),
                        files: files.clone(),
                    })
                    .collect(),
            });
            continue;
        }

        for subject in subjects {
            result
                .matches
                .entry(subject.to_string())
                .or_default()
                .extend(files.iter().map(|d| d.to_record()));
        }
    }

    debug!(
        matched = result.matches.len(),
        duplicates = result.duplicates.len(),
        "Identity matching complete"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drop_row(name: &str) -> DropRow {
        DropRow::parse(name).unwrap()
    }

    #[test]
    fn test_plain_matches() {
        let rows = vec![RegistryRow::new("8001", "1101"), RegistryRow::new("8002", "1102")];
        let drops = vec![drop_row("1101 (2025-01-01)RAW.csv"), drop_row("1101 (2025-02-01)RAW.csv")];

        let result = match_identities(&rows, &drops);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches["8001"].len(), 2);
        assert!(result.matches["8001"].iter().all(|r| r.run.is_none()));
        assert!(result.duplicates.is_empty());
    }

    #[test]
    fn test_lab_with_two_subjects_is_duplicate_group() {
        let rows = vec![RegistryRow::new("7001", "1101"), RegistryRow::new("8001", "1101")];
        let drops = vec![drop_row("1101 (2025-01-01)RAW.csv")];

        let result = match_identities(&rows, &drops);
        assert!(result.matches.is_empty());
        assert_eq!(result.duplicates.len(), 1);
        let subjects: Vec<_> = result.duplicates[0]
            .entries
            .iter()
            .map(|e| e.subject_id.as_str())
            .collect();
        assert_eq!(subjects, vec!["7001", "8001"]);
    }

    #[test]
    fn test_subject_with_two_labs_is_dropped() {
        let rows = vec![RegistryRow::new("8001", "1101"), RegistryRow::new("8001", "1102")];
        let drops = vec![drop_row("1101 (2025-01-01)RAW.csv"), drop_row("1102 (2025-01-02)RAW.csv")];
        assert_eq!(match_identities(&rows, &drops), MatchResult::default());
    }
}
