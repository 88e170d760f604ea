//! Arrival gating: a raw filesystem event only becomes a [`FileEvent`]
//! once the file has settled and has not been handled before.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::config::Config;
use crate::models::FileEvent;

/// Check that a file has finished copying: size and mtime unchanged across
/// the window, and non-empty. Blocking; runs on the watcher thread.
pub fn is_file_stable(path: &Path, window: Duration) -> bool {
    let before = match path.metadata() {
        Ok(m) => m,
        Err(_) => return false,
    };
    std::thread::sleep(window.max(Duration::from_millis(50)));
    let after = match path.metadata() {
        Ok(m) => m,
        Err(_) => return false,
    };
    before.len() == after.len()
        && after.len() > 0
        && before.modified().ok() == after.modified().ok()
}

/// Stateful gate applied to every raw event path.
///
/// Two maps back it: `recent` rate-limits bursts of raw events for the same
/// path, `emitted` remembers the mtime each path was last emitted with so a
/// fully handled file is never re-emitted.
pub struct DebounceGate {
    config: Arc<Config>,
    recent: HashMap<PathBuf, Instant>,
    emitted: HashMap<PathBuf, SystemTime>,
}

impl DebounceGate {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            recent: HashMap::new(),
            emitted: HashMap::new(),
        }
    }

    /// Run all gates against `path`. Blocks for the debounce window while
    /// confirming stability. Returns the event to emit, or `None` when the
    /// path is filtered, unstable, or already handled.
    pub fn evaluate(&mut self, path: &Path) -> Option<FileEvent> {
        if !path.is_file() {
            return None;
        }
        if !self.config.extension_allowed(path) {
            return None;
        }

        // Burst suppression per path
        let debounce = self.config.debounce();
        if let Some(last) = self.recent.get(path) {
            if last.elapsed() < debounce {
                return None;
            }
        }
        self.recent.insert(path.to_path_buf(), Instant::now());

        let metadata = match path.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("⚠️ cannot stat {}: {}", path.display(), e);
                return None;
            }
        };
        if metadata.len() == 0 {
            return None;
        }
        if metadata.len() / (1024 * 1024) > self.config.max_file_size_mb {
            warn!(
                "⚠️ file too large, skipping: {} ({:.2} MB)",
                path.display(),
                metadata.len() as f64 / (1024.0 * 1024.0)
            );
            return None;
        }

        // Wait for the copy to finish; one retry, then give up and let the
        // next raw event try again.
        if !is_file_stable(path, debounce) {
            std::thread::sleep(debounce);
            if !is_file_stable(path, debounce) {
                debug!("⏳ still unstable: {}", path.display());
                return None;
            }
        }

        let final_meta = match path.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!("⚠️ cannot stat {}: {}", path.display(), e);
                return None;
            }
        };
        let mtime = final_meta.modified().ok()?;

        if self.emitted.get(path) == Some(&mtime) {
            debug!("already handled: {}", path.display());
            return None;
        }
        self.emitted.insert(path.to_path_buf(), mtime);

        Some(FileEvent::new(path, final_meta.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn gate_with(debounce_ms: u64) -> DebounceGate {
        let config = Config {
            debounce_ms,
            ..Config::default()
        };
        DebounceGate::new(Arc::new(config))
    }

    #[test]
    fn rejects_unknown_extensions_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate_with(50);

        let txt = dir.path().join("notes.txt");
        fs::write(&txt, b"hello").unwrap();
        assert!(gate.evaluate(&txt).is_none());

        let empty = dir.path().join("empty.csv");
        fs::write(&empty, b"").unwrap();
        assert!(gate.evaluate(&empty).is_none());
    }

    #[test]
    fn settled_file_is_emitted_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate_with(50);

        let file = dir.path().join("data.csv");
        fs::write(&file, b"a,b,c\n1,2,3\n").unwrap();

        let first = gate.evaluate(&file);
        assert!(first.is_some());
        assert_eq!(first.unwrap().size, 12);

        // Same mtime, second raw event: suppressed.
        std::thread::sleep(Duration::from_millis(80));
        assert!(gate.evaluate(&file).is_none());
    }

    #[test]
    fn rewritten_file_is_emitted_again() {
        let dir = tempfile::tempdir().unwrap();
        let mut gate = gate_with(50);

        let file = dir.path().join("data.csv");
        fs::write(&file, b"v1").unwrap();
        assert!(gate.evaluate(&file).is_some());

        // New content, new mtime: a fresh arrival.
        std::thread::sleep(Duration::from_millis(1100));
        fs::write(&file, b"v2-longer").unwrap();
        assert!(gate.evaluate(&file).is_some());
    }
}
