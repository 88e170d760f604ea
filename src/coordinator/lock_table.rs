//! Per-path lock table.
//!
//! At most one active job per distinct file path. The lock is a guard
//! object: dropping it (normally, early, or during a panic unwind) frees
//! the path, so a path can never stay locked after its job is gone.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

#[derive(Clone, Default)]
pub struct LockTable {
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lock for `path`. Returns `None` while another job
    /// holds it; duplicate arrivals are discarded on that branch.
    pub fn try_acquire(&self, path: &Path) -> Option<PathGuard> {
        let mut held = self.held.lock().expect("lock table poisoned");
        if held.contains(path) {
            return None;
        }
        held.insert(path.to_path_buf());
        debug!("🔒 path locked: {}", path.display());
        Some(PathGuard {
            held: Arc::clone(&self.held),
            path: path.to_path_buf(),
        })
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        self.held.lock().expect("lock table poisoned").contains(path)
    }

    pub fn active(&self) -> usize {
        self.held.lock().expect("lock table poisoned").len()
    }
}

/// Scoped ownership of one path slot.
pub struct PathGuard {
    held: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl PathGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.path);
        }
        debug!("🔓 path released: {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_held() {
        let table = LockTable::new();
        let path = Path::new("/shared/a.xlsx");

        let guard = table.try_acquire(path).expect("first acquire");
        assert!(table.try_acquire(path).is_none());
        assert!(table.is_locked(path));

        drop(guard);
        assert!(!table.is_locked(path));
        assert!(table.try_acquire(path).is_some());
    }

    #[test]
    fn distinct_paths_do_not_contend() {
        let table = LockTable::new();
        let _a = table.try_acquire(Path::new("/shared/a.xlsx")).unwrap();
        let _b = table.try_acquire(Path::new("/shared/b.xlsx")).unwrap();
        assert_eq!(table.active(), 2);
    }

    #[test]
    fn lock_survives_a_panicking_holder() {
        let table = LockTable::new();
        let path = PathBuf::from("/shared/a.xlsx");

        let table_clone = table.clone();
        let path_clone = path.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = table_clone.try_acquire(&path_clone).unwrap();
            panic!("job blew up");
        });
        assert!(result.is_err());
        assert!(!table.is_locked(&path));
    }
}
