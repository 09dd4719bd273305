//! Test Helper Utilities
//!
//! Shared fixtures for act-ingest integration tests

#![allow(dead_code)]

pub mod faulty_fs;
pub mod log_capture;

pub use faulty_fs::FaultyFs;
pub use log_capture::{capture_logs, LogCapture};

use act_common::config::SystemPaths;
use act_common::{SessionRecord, Study};
use act_ingest::layout::SessionLayout;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Study roots, drop and manifest under one temp directory
pub struct Fixture {
    pub root: TempDir,
    pub paths: SystemPaths,
    pub layout: SessionLayout,
}

impl Fixture {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let paths = SystemPaths::new(
            root.path().join("int"),
            root.path().join("obs"),
            Some(root.path().join("drop")),
        );
        fs::create_dir_all(&paths.int_dir).unwrap();
        fs::create_dir_all(&paths.obs_dir).unwrap();
        fs::create_dir_all(root.path().join("drop")).unwrap();
        let layout = SessionLayout::from_paths(&paths);
        Self { root, paths, layout }
    }

    pub fn drop_dir(&self) -> PathBuf {
        self.root.path().join("drop")
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.path().join("res").join("data.json")
    }

    /// Write a raw file into the network drop
    pub fn write_drop(&self, filename: &str, content: &str) {
        fs::write(self.drop_dir().join(filename), content).unwrap();
    }

    /// Create `ses-<run>` holding its canonical csv
    pub fn seed_session(&self, study: Study, subject: &str, run: u32, content: &str) {
        fs::create_dir_all(self.layout.session_dir(study, subject, run)).unwrap();
        fs::write(self.layout.session_file(study, subject, run), content).unwrap();
    }

    pub fn read_session(&self, study: Study, subject: &str, run: u32) -> String {
        fs::read_to_string(self.layout.session_file(study, subject, run)).unwrap()
    }

    /// Stored record as a committed transaction would have written it
    pub fn stored(&self, study: Study, subject: &str, lab: &str, date: &str, run: u32) -> SessionRecord {
        SessionRecord::new(raw_name(lab, date), lab, date)
            .unwrap()
            .with_run(run)
            .with_study(study)
            .with_file_path(self.layout.session_file(study, subject, run))
    }
}

/// `<lab> (<date>)RAW.csv`
pub fn raw_name(lab: &str, date: &str) -> String {
    format!("{} ({})RAW.csv", lab, &date[..10])
}

/// Freshly matched record for a drop file
pub fn incoming(lab: &str, date: &str) -> SessionRecord {
    SessionRecord::new(raw_name(lab, date), lab, date).unwrap()
}

/// Every directory name under `dir` that looks like a staged temp
pub fn temp_leftovers(dir: &Path) -> Vec<String> {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".tmp-"))
            .collect(),
        Err(_) => Vec::new(),
    }
}
