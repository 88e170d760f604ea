use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A qualifying file that appeared in the watched folder and settled.
///
/// Identity is the canonicalized path: two events with the same canonical
/// path describe the same arrival for locking purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEvent {
    pub path: PathBuf,
    pub detected_at: DateTime<Local>,
    pub size: u64,
}

impl FileEvent {
    /// Build an event for `path`, canonicalizing it where possible. Size is
    /// taken from the caller, which has already stat'ed the file during the
    /// stability check.
    pub fn new(path: &Path, size: u64) -> Self {
        let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        Self {
            path,
            detected_at: Local::now(),
            size,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Source file name without extension, used for deterministic report
    /// and artifact names.
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn size_mb(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stem_and_name_come_from_the_path() {
        let event = FileEvent {
            path: PathBuf::from("/shared/report_2024.xlsx"),
            detected_at: Local::now(),
            size: 1024,
        };
        assert_eq!(event.file_name(), "report_2024.xlsx");
        assert_eq!(event.file_stem(), "report_2024");
    }
}
