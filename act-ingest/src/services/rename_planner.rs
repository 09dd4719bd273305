//! Rename planning
//!
//! Compares a subject's stored records with its canonical records and emits
//! one directory move per acquisition whose session number changed. New
//! acquisitions produce no move; the copy step places them directly.

use crate::layout::SessionLayout;
use act_common::{IdentityKey, SessionRecord, Study};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// One session directory relocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameMove {
    pub key: IdentityKey,
    pub old_run: u32,
    pub new_run: u32,
    pub old_dir: PathBuf,
    pub new_dir: PathBuf,
    pub old_file: PathBuf,
    pub new_file: PathBuf,
}

impl RenameMove {
    /// The move that undoes this one
    pub fn inverse(&self) -> RenameMove {
        RenameMove {
            key: self.key.clone(),
            old_run: self.new_run,
            new_run: self.old_run,
            old_dir: self.new_dir.clone(),
            new_dir: self.old_dir.clone(),
            old_file: self.new_file.clone(),
            new_file: self.old_file.clone(),
        }
    }
}

/// Every move needed to bring one subject's tree to its canonical numbering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub subject_id: String,
    pub study: Study,
    pub moves: Vec<RenameMove>,
}

impl RenamePlan {
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Plan restoring the layout this plan started from
    pub fn inverse(&self) -> RenamePlan {
        RenamePlan {
            subject_id: self.subject_id.clone(),
            study: self.study,
            moves: self.moves.iter().rev().map(RenameMove::inverse).collect(),
        }
    }
}

/// Plan moves from `old` numbering to `new` numbering
pub fn plan_renames(
    subject_id: &str,
    study: Study,
    layout: &SessionLayout,
    old: &[SessionRecord],
    new: &[SessionRecord],
) -> RenamePlan {
    let new_runs: HashMap<IdentityKey, u32> = new
        .iter()
        .filter_map(|r| r.run.map(|run| (r.identity_key(), run)))
        .collect();

    let mut planned = HashSet::new();
    let mut moves = Vec::new();
    for record in old {
        let Some(old_run) = record.run else {
            continue;
        };
        let key = record.identity_key();
        if !planned.insert(key.clone()) {
            continue;
        }
        let Some(&new_run) = new_runs.get(&key) else {
            continue;
        };
        if old_run == new_run {
            continue;
        }

        moves.push(RenameMove {
            key,
            old_run,
            new_run,
            old_dir: layout.session_dir(study, subject_id, old_run),
            new_dir: layout.session_dir(study, subject_id, new_run),
            old_file: layout.session_file(study, subject_id, old_run),
            new_file: layout.session_file(study, subject_id, new_run),
        });
    }

    RenamePlan {
        subject_id: subject_id.to_string(),
        study,
        moves,
    }
}
