//! Session directory layout
//!
//! ```text
//! study root (int / obs)
//!   |-> sub-<id>
//!         |-> accel
//!               |-> ses-<n>
//!                     |-> sub-<id>_ses-<n>_accel.csv
//!               |-> all            (optional link tree)
//! ```
//!
//! Every path is a pure function of `(study, subject, session)`.

use act_common::config::SystemPaths;
use act_common::Study;
use std::path::{Path, PathBuf};

pub const ACCEL_DIR: &str = "accel";
pub const LINK_DIR: &str = "all";
pub const ACCEL_CSV_SUFFIX: &str = "_accel.csv";

const SUBJECT_PREFIX: &str = "sub-";
const SESSION_PREFIX: &str = "ses-";

/// Resolves canonical locations under the two study roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    int_root: PathBuf,
    obs_root: PathBuf,
}

impl SessionLayout {
    pub fn new(int_root: impl Into<PathBuf>, obs_root: impl Into<PathBuf>) -> Self {
        Self {
            int_root: int_root.into(),
            obs_root: obs_root.into(),
        }
    }

    pub fn from_paths(paths: &SystemPaths) -> Self {
        Self::new(paths.int_dir.clone(), paths.obs_dir.clone())
    }

    pub fn study_root(&self, study: Study) -> &Path {
        match study {
            Study::Int => &self.int_root,
            Study::Obs => &self.obs_root,
        }
    }

    /// `(study, root)` pairs, interventional first
    pub fn roots(&self) -> [(Study, &Path); 2] {
        [
            (Study::Int, self.int_root.as_path()),
            (Study::Obs, self.obs_root.as_path()),
        ]
    }

    pub fn subject_dir(&self, study: Study, subject_id: &str) -> PathBuf {
        self.study_root(study)
            .join(format!("{}{}", SUBJECT_PREFIX, subject_id))
    }

    pub fn accel_dir(&self, study: Study, subject_id: &str) -> PathBuf {
        self.subject_dir(study, subject_id).join(ACCEL_DIR)
    }

    pub fn session_dir(&self, study: Study, subject_id: &str, session: u32) -> PathBuf {
        self.accel_dir(study, subject_id)
            .join(format!("{}{}", SESSION_PREFIX, session))
    }

    pub fn session_file(&self, study: Study, subject_id: &str, session: u32) -> PathBuf {
        self.session_dir(study, subject_id, session)
            .join(session_file_name(subject_id, session))
    }
}

/// `sub-<id>_ses-<n>_accel.csv`
pub fn session_file_name(subject_id: &str, session: u32) -> String {
    format!(
        "{}{}_{}{}{}",
        SUBJECT_PREFIX, subject_id, SESSION_PREFIX, session, ACCEL_CSV_SUFFIX
    )
}

/// Session number from a `ses-<n>` directory name
pub fn parse_session_dir(name: &str) -> Option<u32> {
    name.strip_prefix(SESSION_PREFIX)?
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
}

/// Subject ID from a `sub-<id>` directory name
pub fn parse_subject_dir(name: &str) -> Option<&str> {
    name.strip_prefix(SUBJECT_PREFIX).filter(|id| !id.is_empty())
}

/// Whether a file name looks like a canonical accel CSV
pub fn is_accel_csv(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(ACCEL_CSV_SUFFIX)
}
