//! `sub-*/accel/all` link trees
//!
//! Downstream tooling reads every session of a subject from one flat
//! directory. The tree is rebuilt from scratch after each placement and
//! removed at the start of runs that do not maintain it.

use crate::layout::{ACCEL_DIR, LINK_DIR};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Rebuild `<accel_dir>/all` with one link per CSV under `accel_dir`
///
/// Relative sub-paths are mirrored (`all/ses-1/x.csv`). Where the platform
/// refuses symlinks the CSVs are copied instead. Returns the number of
/// entries written.
pub fn refresh_subject_links(accel_dir: &Path) -> io::Result<usize> {
    if !accel_dir.is_dir() {
        return Ok(0);
    }

    let csv_files: Vec<(PathBuf, PathBuf)> = WalkDir::new(accel_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == LINK_DIR))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_csv(e.path()))
        .filter_map(|e| {
            let rel = e.path().strip_prefix(accel_dir).ok()?.to_path_buf();
            Some((e.into_path(), rel))
        })
        .collect();

    let all_dir = accel_dir.join(LINK_DIR);
    remove_link_dir(&all_dir)?;
    fs::create_dir_all(&all_dir)?;

    let mut use_symlinks = true;
    for (source, rel) in &csv_files {
        let link = all_dir.join(rel);
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)?;
        }

        if use_symlinks {
            match symlink_file(source, &link) {
                Ok(()) => continue,
                Err(e) if symlinks_refused(&e) => {
                    use_symlinks = false;
                    warn!(
                        "Symlinks are not supported in {}; copying CSVs into {}/{} instead",
                        accel_dir.display(),
                        ACCEL_DIR,
                        LINK_DIR
                    );
                }
                Err(e) => return Err(e),
            }
        }
        fs::copy(source, &link)?;
    }

    debug!(dir = %all_dir.display(), entries = csv_files.len(), "Session links refreshed");
    Ok(csv_files.len())
}

/// Delete every `sub-*/accel/all` under the given study roots
///
/// Failures are logged and skipped.
pub fn remove_link_directories(study_roots: &[&Path]) -> usize {
    let mut removed = 0;
    for root in study_roots {
        let Ok(entries) = fs::read_dir(root) else {
            continue;
        };
        for entry in entries.flatten() {
            let all_dir = entry.path().join(ACCEL_DIR).join(LINK_DIR);
            if fs::symlink_metadata(&all_dir).is_err() {
                continue;
            }
            match remove_link_dir(&all_dir) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Unable to remove {}: {}", all_dir.display(), e),
            }
        }
    }
    if removed > 0 {
        debug!(removed, "Removed session link directories");
    }
    removed
}

/// Remove a link directory, whether it is itself a symlink or a real tree
fn remove_link_dir(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => fs::remove_file(path),
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("csv"))
}

fn symlinks_refused(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
    )
}

#[cfg(unix)]
fn symlink_file(source: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
fn symlink_file(source: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(source, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink_file(_source: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "symlinks unavailable"))
}
