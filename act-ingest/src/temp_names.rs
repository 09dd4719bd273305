//! Unique temporary names for staged session directories

use crate::fs::SessionFs;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::io;
use std::path::{Path, PathBuf};

const TEMP_PREFIX: &str = ".tmp-";
const MAX_ATTEMPTS: usize = 1000;

/// Allocates a sibling path that does not exist yet
pub trait TempNameAllocator {
    fn allocate(&self, parent: &Path, hint: &str, fs: &dyn SessionFs) -> io::Result<PathBuf>;
}

/// `.tmp-<hint>`, then `.tmp-<hint>-1`, `.tmp-<hint>-2`, ...
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterAllocator;

impl TempNameAllocator for CounterAllocator {
    fn allocate(&self, parent: &Path, hint: &str, fs: &dyn SessionFs) -> io::Result<PathBuf> {
        let base = format!("{}{}", TEMP_PREFIX, hint);
        let first = parent.join(&base);
        if !fs.exists(&first) {
            return Ok(first);
        }
        for counter in 1..MAX_ATTEMPTS {
            let candidate = parent.join(format!("{}-{}", base, counter));
            if !fs.exists(&candidate) {
                return Ok(candidate);
            }
        }
        Err(exhausted(parent, hint))
    }
}

/// `.tmp-<hint>-<8 random chars>`, re-drawn on collision
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomAllocator;

impl TempNameAllocator for RandomAllocator {
    fn allocate(&self, parent: &Path, hint: &str, fs: &dyn SessionFs) -> io::Result<PathBuf> {
        let mut rng = rand::thread_rng();
        for _ in 0..MAX_ATTEMPTS {
            let suffix: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(8)
                .map(char::from)
                .collect();
            let candidate = parent.join(format!("{}{}-{}", TEMP_PREFIX, hint, suffix));
            if !fs.exists(&candidate) {
                return Ok(candidate);
            }
        }
        Err(exhausted(parent, hint))
    }
}

fn exhausted(parent: &Path, hint: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!(
            "no free temporary name for {} under {}",
            hint,
            parent.display()
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::StdFs;
    use tempfile::TempDir;

    #[test]
    fn test_counter_allocator_skips_taken_names() {
        let dir = TempDir::new().unwrap();
        let first = CounterAllocator.allocate(dir.path(), "8001-1-1-to-2", &StdFs).unwrap();
        assert_eq!(first, dir.path().join(".tmp-8001-1-1-to-2"));

        std::fs::create_dir(&first).unwrap();
        std::fs::create_dir(dir.path().join(".tmp-8001-1-1-to-2-1")).unwrap();
        let next = CounterAllocator.allocate(dir.path(), "8001-1-1-to-2", &StdFs).unwrap();
        assert_eq!(next, dir.path().join(".tmp-8001-1-1-to-2-2"));
    }

    #[test]
    fn test_random_allocator_returns_fresh_sibling() {
        let dir = TempDir::new().unwrap();
        let a = RandomAllocator.allocate(dir.path(), "x", &StdFs).unwrap();
        assert_eq!(a.parent(), Some(dir.path()));
        assert!(!a.exists());
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".tmp-x-"));
    }
}
