//! Fault-injecting filesystem
//!
//! Delegates to [`StdFs`] but fails the N-th `rename` or `copy` call
//! (1-based), so rollback paths can be driven deterministically. Directory
//! removal can be made to fail outright.

use act_ingest::fs::{SessionFs, StdFs};
use std::cell::Cell;
use std::io;
use std::path::Path;

#[derive(Debug, Default)]
pub struct FaultyFs {
    fail_rename_at: Option<usize>,
    fail_copy_at: Option<usize>,
    fail_remove_dir: bool,
    renames: Cell<usize>,
    copies: Cell<usize>,
}

impl FaultyFs {
    pub fn failing_rename(n: usize) -> Self {
        Self {
            fail_rename_at: Some(n),
            ..Self::default()
        }
    }

    pub fn failing_copy(n: usize) -> Self {
        Self {
            fail_copy_at: Some(n),
            ..Self::default()
        }
    }

    /// Also refuse every `remove_dir`
    pub fn refusing_remove_dir(mut self) -> Self {
        self.fail_remove_dir = true;
        self
    }

    pub fn rename_calls(&self) -> usize {
        self.renames.get()
    }
}

fn injected(op: &str, call: usize) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {} failure on call {}", op, call))
}

impl SessionFs for FaultyFs {
    fn exists(&self, path: &Path) -> bool {
        StdFs.exists(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let call = self.renames.get() + 1;
        self.renames.set(call);
        if self.fail_rename_at == Some(call) {
            return Err(injected("rename", call));
        }
        StdFs.rename(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        StdFs.create_dir_all(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        let call = self.copies.get() + 1;
        self.copies.set(call);
        if self.fail_copy_at == Some(call) {
            return Err(injected("copy", call));
        }
        StdFs.copy(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        StdFs.remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        if self.fail_remove_dir {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected remove_dir failure"));
        }
        StdFs.remove_dir(path)
    }

    fn read_dir_names(&self, path: &Path) -> io::Result<Vec<String>> {
        StdFs.read_dir_names(path)
    }
}
