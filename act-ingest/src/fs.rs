//! Filesystem seam for the session tree
//!
//! The mover, copier and duplicate resolver touch disk only through
//! [`SessionFs`], so tests can inject failures at an exact step.

use crate::layout::is_accel_csv;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Filesystem operations used while mutating a subject's session tree
pub trait SessionFs {
    fn exists(&self, path: &Path) -> bool;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove an empty directory
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Entry names in `path`, sorted
    fn read_dir_names(&self, path: &Path) -> io::Result<Vec<String>>;
}

/// [`SessionFs`] backed by `std::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFs;

impl SessionFs for StdFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn read_dir_names(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// First canonical accel CSV inside a session directory
pub fn find_accel_csv(fs: &dyn SessionFs, dir: &Path) -> io::Result<Option<PathBuf>> {
    if !fs.exists(dir) {
        return Ok(None);
    }
    Ok(fs
        .read_dir_names(dir)?
        .into_iter()
        .find(|name| is_accel_csv(name))
        .map(|name| dir.join(name)))
}

/// Remove directories that were created empty, deepest first
///
/// Returns the directories that could not be removed.
pub fn remove_empty_dirs(fs: &dyn SessionFs, dirs: &[PathBuf]) -> Vec<(PathBuf, io::Error)> {
    let mut ordered: Vec<&PathBuf> = dirs.iter().collect();
    ordered.sort_by(|a, b| {
        b.components()
            .count()
            .cmp(&a.components().count())
            .then_with(|| a.cmp(b))
    });
    ordered.dedup();

    let mut failed = Vec::new();
    for dir in ordered {
        if !fs.exists(dir) {
            continue;
        }
        if let Err(e) = fs.remove_dir(dir) {
            failed.push((dir.clone(), e));
        }
    }
    failed
}
