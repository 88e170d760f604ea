//! Processing job state machine.
//!
//! `PENDING → LOCKED → RUNNING → {SUCCEEDED, FAILED} → RELEASED`
//!
//! A retry restarts from `LOCKED` with a fresh browser session. `RELEASED`
//! is reached on every exit path; the per-path lock itself is freed by a
//! guard so even a panicking job cannot leave its path locked.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::event::FileEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Locked,
    Running,
    Succeeded,
    Failed,
    Released,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "PENDING",
            JobState::Locked => "LOCKED",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Released => "RELEASED",
        };
        write!(f, "{}", name)
    }
}

/// One attempt (with possible retries) to process a single arrival event
/// to a terminal outcome. Owned exclusively by the coordinator task.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub event: FileEvent,
    pub state: JobState,
    pub attempt: u32,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
    pub error: Option<String>,
}

impl ProcessingJob {
    pub fn new(event: FileEvent) -> Self {
        Self {
            event,
            state: JobState::Pending,
            attempt: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Move to the next state, logging the transition.
    pub fn advance(&mut self, next: JobState) {
        debug!(
            "[{}] state: {} → {}",
            self.event.file_name(),
            self.state,
            next
        );
        match next {
            JobState::Running if self.started_at.is_none() => {
                self.started_at = Some(Local::now());
            }
            JobState::Succeeded | JobState::Failed => {
                self.finished_at = Some(Local::now());
            }
            _ => {}
        }
        self.state = next;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            JobState::Succeeded | JobState::Failed | JobState::Released
        )
    }
}

/// Kind of terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Succeeded,
    Failed,
    /// An arrival for a path whose job was still holding the lock. Not an
    /// error; the arrival is discarded without opening a session.
    Duplicate,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutcomeKind::Succeeded => "succeeded",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Duplicate => "duplicate",
        };
        write!(f, "{}", name)
    }
}

/// Terminal record of one job, handed to the report sink and returned to
/// the coordinator loop for statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub kind: OutcomeKind,
    pub path: PathBuf,
    pub attempts: u32,
    pub reason: Option<String>,
    /// Report document written for this job, when any
    pub report_path: Option<PathBuf>,
    /// Where the source file ended up (processed/ or failed/)
    pub routed_to: Option<PathBuf>,
}

impl JobOutcome {
    pub fn duplicate(path: PathBuf) -> Self {
        Self {
            kind: OutcomeKind::Duplicate,
            path,
            attempts: 0,
            reason: None,
            report_path: None,
            routed_to: None,
        }
    }
}
