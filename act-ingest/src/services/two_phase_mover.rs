//! Two-phase session directory mover
//!
//! A direct `ses-1 -> ses-2, ses-2 -> ses-1` sequence overwrites or orphans a
//! directory halfway through. Every move is therefore staged:
//!
//! 1. each `old_dir` is renamed to a fresh temporary sibling
//! 2. each temporary directory is renamed into `new_dir`, and the CSV inside
//!    is renamed to match the new session number
//!
//! On failure the completed hops are walked back, through fresh temporary
//! names again, and every staged directory is returned to its `old_dir`.
//! Each pre-existing session directory lives at exactly one path throughout.

use crate::error::{IngestError, IngestResult};
use crate::fs::{find_accel_csv, SessionFs};
use crate::services::rename_planner::{RenameMove, RenamePlan};
use crate::temp_names::TempNameAllocator;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a staged directory currently sits
#[derive(Debug, Clone, PartialEq, Eq)]
enum HopState {
    Staged,
    /// In `new_dir`; `renamed_from` is the CSV's path before it was renamed
    Placed { renamed_from: Option<PathBuf> },
}

/// A CSV renamed while its directory was placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRename {
    /// Directory the CSV now lives in
    pub dir: PathBuf,
    /// File name it carried before the move
    pub original_name: OsString,
}

/// What a successful [`TwoPhaseMover::apply`] changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveReport {
    pub moved: usize,
    pub csv_renames: Vec<CsvRename>,
}

impl MoveReport {
    /// Inverse of `plan` that also restores every renamed CSV's original name
    pub fn rollback_plan(&self, plan: &RenamePlan) -> RenamePlan {
        let mut inverse = plan.inverse();
        for mv in &mut inverse.moves {
            if let Some(rename) = self.csv_renames.iter().find(|r| r.dir == mv.old_dir) {
                mv.new_file = mv.new_dir.join(&rename.original_name);
            }
        }
        inverse
    }
}

#[derive(Debug)]
struct Hop<'p> {
    mv: &'p RenameMove,
    temp: PathBuf,
    state: HopState,
}

/// Applies [`RenamePlan`]s through temporary names
pub struct TwoPhaseMover<'a> {
    fs: &'a dyn SessionFs,
    names: &'a dyn TempNameAllocator,
}

impl<'a> TwoPhaseMover<'a> {
    pub fn new(fs: &'a dyn SessionFs, names: &'a dyn TempNameAllocator) -> Self {
        Self { fs, names }
    }

    /// Apply every move in `plan`
    ///
    /// Moves whose source directory does not exist are skipped. On error the
    /// tree is restored before the error is returned.
    pub fn apply(&self, plan: &RenamePlan) -> IngestResult<MoveReport> {
        if plan.is_empty() {
            return Ok(MoveReport::default());
        }

        let mut hops = Vec::with_capacity(plan.moves.len());
        let result = self
            .stage(plan, &mut hops)
            .and_then(|()| self.place(&mut hops));

        match result {
            Ok(()) => {
                debug!(subject = %plan.subject_id, moved = hops.len(), "Session directories renumbered");
                let csv_renames = hops
                    .iter()
                    .filter_map(|hop| match &hop.state {
                        HopState::Placed {
                            renamed_from: Some(original),
                        } => Some(CsvRename {
                            dir: hop.mv.new_dir.clone(),
                            original_name: file_name(original).to_os_string(),
                        }),
                        _ => None,
                    })
                    .collect();
                Ok(MoveReport {
                    moved: hops.len(),
                    csv_renames,
                })
            }
            Err(e) => {
                warn!(
                    subject = %plan.subject_id,
                    error = %e,
                    "Two-phase rename failed; rolling back {} staged directories",
                    hops.len()
                );
                self.rollback(&plan.subject_id, &mut hops);
                Err(e)
            }
        }
    }

    // ========================================================================
    // Phase 1: stage into temporary names
    // ========================================================================

    fn stage<'p>(&self, plan: &'p RenamePlan, hops: &mut Vec<Hop<'p>>) -> IngestResult<()> {
        for (index, mv) in plan.moves.iter().enumerate() {
            if !self.fs.exists(&mv.old_dir) {
                debug!(
                    subject = %plan.subject_id,
                    dir = %mv.old_dir.display(),
                    "Session directory missing; nothing to move"
                );
                continue;
            }

            let hint = format!(
                "{}-{}-{}-to-{}",
                plan.subject_id,
                index + 1,
                mv.old_run,
                mv.new_run
            );
            let temp = self.allocate_beside(&mv.old_dir, &hint)?;
            self.fs
                .rename(&mv.old_dir, &temp)
                .map_err(|source| move_error("stage", &mv.old_dir, source))?;

            hops.push(Hop {
                mv,
                temp,
                state: HopState::Staged,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Phase 2: place into final names
    // ========================================================================

    fn place(&self, hops: &mut [Hop<'_>]) -> IngestResult<()> {
        for hop in hops.iter_mut() {
            let mv = hop.mv;
            if let Some(parent) = mv.new_dir.parent() {
                self.fs
                    .create_dir_all(parent)
                    .map_err(|source| move_error("create parent", parent, source))?;
            }
            self.fs
                .rename(&hop.temp, &mv.new_dir)
                .map_err(|source| move_error("place", &mv.new_dir, source))?;
            hop.state = HopState::Placed { renamed_from: None };

            // Whatever accel csv the directory holds takes the new session's name
            let current = find_accel_csv(self.fs, &mv.new_dir)
                .map_err(|source| move_error("find csv", &mv.new_dir, source))?;
            if let Some(current) = current.filter(|c| *c != mv.new_file) {
                self.fs
                    .rename(&current, &mv.new_file)
                    .map_err(|source| move_error("rename csv", &current, source))?;
                hop.state = HopState::Placed {
                    renamed_from: Some(current),
                };
            }
        }
        Ok(())
    }

    // ========================================================================
    // Rollback
    // ========================================================================

    fn rollback(&self, subject_id: &str, hops: &mut [Hop<'_>]) {
        for hop in hops.iter_mut().rev() {
            let HopState::Placed { renamed_from } = &hop.state else {
                continue;
            };
            let mv = hop.mv;

            if let Some(original) = renamed_from {
                if let Err(e) = self.fs.rename(&mv.new_file, original) {
                    warn!(subject = %subject_id, error = %e, "Rollback could not restore csv name");
                }
            }

            let hint = format!("{}-rollback-{}", subject_id, mv.new_run);
            let restaged = self
                .allocate_beside(&mv.new_dir, &hint)
                .and_then(|temp| {
                    self.fs
                        .rename(&mv.new_dir, &temp)
                        .map(|()| temp)
                        .map_err(|source| move_error("restage", &mv.new_dir, source))
                });
            match restaged {
                Ok(temp) => {
                    hop.temp = temp;
                    hop.state = HopState::Staged;
                }
                Err(e) => {
                    warn!(subject = %subject_id, error = %e, "Rollback could not restage directory");
                }
            }
        }

        for hop in hops.iter().rev() {
            if hop.state != HopState::Staged {
                continue;
            }
            if let Err(e) = self.fs.rename(&hop.temp, &hop.mv.old_dir) {
                warn!(
                    subject = %subject_id,
                    error = %e,
                    temp = %hop.temp.display(),
                    "Rollback could not restore {}",
                    hop.mv.old_dir.display()
                );
            }
        }
    }

    fn allocate_beside(&self, dir: &Path, hint: &str) -> IngestResult<PathBuf> {
        let parent = dir.parent().unwrap_or_else(|| Path::new("."));
        self.names
            .allocate(parent, hint, self.fs)
            .map_err(|source| move_error("allocate temp", dir, source))
    }
}

fn move_error(step: &'static str, path: &Path, source: std::io::Error) -> IngestError {
    IngestError::Move {
        step,
        path: path.to_path_buf(),
        source,
    }
}

fn file_name(path: &Path) -> &std::ffi::OsStr {
    path.file_name().unwrap_or(path.as_os_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::StdFs;
    use crate::layout::SessionLayout;
    use crate::services::rename_planner::plan_renames;
    use crate::temp_names::CounterAllocator;
    use act_common::{SessionRecord, Study};
    use std::fs;
    use tempfile::TempDir;

    fn seed(layout: &SessionLayout, run: u32, content: &str) {
        let dir = layout.session_dir(Study::Int, "8001", run);
        fs::create_dir_all(&dir).unwrap();
        fs::write(layout.session_file(Study::Int, "8001", run), content).unwrap();
    }

    fn rec(filename: &str, date: &str, run: u32) -> SessionRecord {
        SessionRecord::new(filename, "1101", date).unwrap().with_run(run)
    }

    #[test]
    fn test_swap_two_sessions() {
        let root = TempDir::new().unwrap();
        let layout = SessionLayout::new(root.path().join("int"), root.path().join("obs"));
        seed(&layout, 1, "first");
        seed(&layout, 2, "second");

        let old = vec![rec("a.csv", "2025-01-01", 1), rec("b.csv", "2025-01-02", 2)];
        let new = vec![rec("a.csv", "2025-01-01", 2), rec("b.csv", "2025-01-02", 1)];
        let plan = plan_renames("8001", Study::Int, &layout, &old, &new);

        let report = TwoPhaseMover::new(&StdFs, &CounterAllocator).apply(&plan).unwrap();
        assert_eq!(report.moved, 2);
        assert_eq!(report.csv_renames.len(), 2);

        let ses1 = fs::read_to_string(layout.session_file(Study::Int, "8001", 1)).unwrap();
        let ses2 = fs::read_to_string(layout.session_file(Study::Int, "8001", 2)).unwrap();
        assert_eq!(ses1, "second");
        assert_eq!(ses2, "first");

        let leftovers: Vec<_> = fs::read_dir(layout.accel_dir(Study::Int, "8001"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temp dirs left behind: {:?}", leftovers);
    }

    #[test]
    fn test_missing_source_is_skipped() {
        let root = TempDir::new().unwrap();
        let layout = SessionLayout::new(root.path().join("int"), root.path().join("obs"));
        seed(&layout, 1, "only");

        let old = vec![rec("a.csv", "2025-01-01", 1), rec("b.csv", "2025-01-02", 4)];
        let new = vec![rec("a.csv", "2025-01-01", 2), rec("b.csv", "2025-01-02", 3)];
        let plan = plan_renames("8001", Study::Int, &layout, &old, &new);

        let report = TwoPhaseMover::new(&StdFs, &CounterAllocator).apply(&plan).unwrap();
        assert_eq!(report.moved, 1);
        assert!(layout.session_file(Study::Int, "8001", 2).exists());
        assert!(!layout.session_dir(Study::Int, "8001", 3).exists());
    }

    #[test]
    fn test_non_canonical_csv_is_renamed_and_restorable() {
        let root = TempDir::new().unwrap();
        let layout = SessionLayout::new(root.path().join("int"), root.path().join("obs"));
        let dir = layout.session_dir(Study::Int, "8001", 1);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("sub-8001_ses-7_accel.csv"), "stray").unwrap();

        let old = vec![rec("a.csv", "2025-01-01", 1)];
        let new = vec![rec("a.csv", "2025-01-01", 2)];
        let plan = plan_renames("8001", Study::Int, &layout, &old, &new);
        let mover = TwoPhaseMover::new(&StdFs, &CounterAllocator);

        let report = mover.apply(&plan).unwrap();
        let placed = layout.session_file(Study::Int, "8001", 2);
        assert_eq!(fs::read_to_string(&placed).unwrap(), "stray");
        assert_eq!(
            report.csv_renames,
            vec![CsvRename {
                dir: layout.session_dir(Study::Int, "8001", 2),
                original_name: "sub-8001_ses-7_accel.csv".into(),
            }]
        );

        mover.apply(&report.rollback_plan(&plan)).unwrap();
        assert_eq!(fs::read_to_string(dir.join("sub-8001_ses-7_accel.csv")).unwrap(), "stray");
        assert!(!layout.session_dir(Study::Int, "8001", 2).exists());
    }
}
