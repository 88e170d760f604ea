//! Report/notification sink.
//!
//! Every terminal job outcome produces a JSON report document, and the
//! source file is routed out of the shared folder: successes to the
//! processed folder, exhausted failures to the failed folder. Moves fall
//! back to copy+remove so cross-volume shares keep working.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ReportError, Result};
use crate::models::{JobOutcome, OutcomeKind, ProcessingJob};

/// Persists terminal outcomes and routes source files.
pub struct ReportSink {
    reports_folder: PathBuf,
    screenshots_folder: PathBuf,
    processed_folder: PathBuf,
    failed_folder: PathBuf,
    move_processed_files: bool,
    delete_after_processing: bool,
}

#[derive(Debug, Serialize)]
struct ReportRecord<'a> {
    app: &'a str,
    file: String,
    source_path: String,
    outcome: OutcomeKind,
    attempts: u32,
    started_at: Option<String>,
    finished_at: Option<String>,
    error: Option<&'a str>,
    artifact: Option<String>,
    routed_to: Option<String>,
}

impl ReportSink {
    pub fn new(config: &Config) -> Self {
        Self {
            reports_folder: config.reports_folder.clone(),
            screenshots_folder: config.screenshots_folder.clone(),
            processed_folder: config.processed_folder.clone(),
            failed_folder: config.failed_folder.clone(),
            move_processed_files: config.move_processed_files,
            delete_after_processing: config.delete_after_processing,
        }
    }

    /// Record a successful job: write the captured artifact and report,
    /// then archive the source file into the processed folder.
    pub fn record_success(&self, job: &ProcessingJob, artifact: &[u8]) -> Result<JobOutcome> {
        let artifact_path = self.write_artifact(job, artifact)?;
        let routed_to = self.route_source(job, &self.processed_folder)?;
        let report_path = self.write_report(job, OutcomeKind::Succeeded, artifact_path.as_deref(), routed_to.as_deref())?;
        info!(
            "✅ report written: {} → {}",
            job.event.file_name(),
            report_path.display()
        );
        Ok(JobOutcome {
            kind: OutcomeKind::Succeeded,
            path: job.event.path.clone(),
            attempts: job.attempt,
            reason: None,
            report_path: Some(report_path),
            routed_to,
        })
    }

    /// Record a job that exhausted its retries (or was cancelled): write
    /// the report and archive the source into the failed folder.
    pub fn record_failure(&self, job: &ProcessingJob) -> Result<JobOutcome> {
        let routed_to = self.route_source(job, &self.failed_folder)?;
        let report_path =
            self.write_report(job, OutcomeKind::Failed, None, routed_to.as_deref())?;
        info!(
            "❌ failure report written: {} → {}",
            job.event.file_name(),
            report_path.display()
        );
        Ok(JobOutcome {
            kind: OutcomeKind::Failed,
            path: job.event.path.clone(),
            attempts: job.attempt,
            reason: job.error.clone(),
            report_path: Some(report_path),
            routed_to,
        })
    }

    /// Report document path for a source file name. Deterministic: the
    /// same source name always maps to the same report name.
    pub fn report_path_for(&self, stem: &str) -> PathBuf {
        self.reports_folder.join(format!("{}.report.json", stem))
    }

    fn write_report(
        &self,
        job: &ProcessingJob,
        outcome: OutcomeKind,
        artifact: Option<&Path>,
        routed_to: Option<&Path>,
    ) -> Result<PathBuf> {
        let path = self.report_path_for(&job.event.file_stem());
        let record = ReportRecord {
            app: env!("CARGO_PKG_NAME"),
            file: job.event.file_name(),
            source_path: job.event.path.display().to_string(),
            outcome,
            attempts: job.attempt,
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            finished_at: job.finished_at.map(|t| t.to_rfc3339()),
            error: job.error.as_deref(),
            artifact: artifact.map(|p| p.display().to_string()),
            routed_to: routed_to.map(|p| p.display().to_string()),
        };
        let body = serde_json::to_string_pretty(&record)?;
        fs::write(&path, body).map_err(|e| ReportError::WriteFailed {
            path: path.clone(),
            source: Box::new(e),
        })?;
        Ok(path)
    }

    fn write_artifact(&self, job: &ProcessingJob, artifact: &[u8]) -> Result<Option<PathBuf>> {
        if artifact.is_empty() {
            return Ok(None);
        }
        let path = self
            .screenshots_folder
            .join(format!("{}.png", job.event.file_stem()));
        fs::write(&path, artifact).map_err(|e| ReportError::WriteFailed {
            path: path.clone(),
            source: Box::new(e),
        })?;
        info!("📸 artifact saved: {}", path.display());
        Ok(Some(path))
    }

    /// Move the source file into `destination` with a timestamp suffix.
    /// Honors the delete/move switches; returns where the file went.
    fn route_source(&self, job: &ProcessingJob, destination: &Path) -> Result<Option<PathBuf>> {
        let source = &job.event.path;
        if !source.exists() {
            warn!("⚠️ source vanished before routing: {}", source.display());
            return Ok(None);
        }
        if self.delete_after_processing {
            fs::remove_file(source).map_err(|e| ReportError::MoveFailed {
                from: source.clone(),
                to: destination.to_path_buf(),
                source: Box::new(e),
            })?;
            info!("🗑️ source deleted: {}", job.event.file_name());
            return Ok(None);
        }
        if !self.move_processed_files {
            return Ok(None);
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let target = destination.join(format!("{}_{}{}", job.event.file_stem(), timestamp, ext));

        move_file(source, &target)?;
        info!("📦 file moved: {} → {}", job.event.file_name(), target.display());
        Ok(Some(target))
    }
}

/// Rename, falling back to copy+remove for cross-volume destinations.
fn move_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| ReportError::MoveFailed {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            source: Box::new(e),
        })?;
    }
    if fs::rename(source, target).is_ok() {
        return Ok(());
    }
    fs::copy(source, target)
        .and_then(|_| fs::remove_file(source))
        .map_err(|e| ReportError::MoveFailed {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            source: Box::new(e),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FileEvent;
    use crate::models::JobState;

    fn sink_in(dir: &Path) -> (ReportSink, Config) {
        let config = Config {
            base_url: "http://localhost:5002".to_string(),
            shared_folder: dir.join("shared"),
            processed_folder: dir.join("processed"),
            failed_folder: dir.join("failed"),
            reports_folder: dir.join("reports"),
            screenshots_folder: dir.join("screenshots"),
            logs_folder: dir.join("logs"),
            ..Config::default()
        };
        config.ensure_directories_exist().unwrap();
        (ReportSink::new(&config), config)
    }

    fn finished_job(config: &Config, name: &str) -> ProcessingJob {
        let path = config.shared_folder.join(name);
        fs::write(&path, b"cell1,cell2").unwrap();
        let mut job = ProcessingJob::new(FileEvent::new(&path, 11));
        job.advance(JobState::Locked);
        job.advance(JobState::Running);
        job.attempt = 1;
        job
    }

    #[test]
    fn success_writes_report_artifact_and_moves_source() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, config) = sink_in(dir.path());
        let mut job = finished_job(&config, "report_2024.xlsx");
        job.advance(JobState::Succeeded);

        let outcome = sink.record_success(&job, b"png-bytes").unwrap();

        assert_eq!(outcome.kind, OutcomeKind::Succeeded);
        let report = outcome.report_path.unwrap();
        assert_eq!(report, sink.report_path_for("report_2024"));
        assert!(report.exists());
        assert!(config.screenshots_folder.join("report_2024.png").exists());

        // Source left the shared folder for processed/.
        assert!(!job.event.path.exists());
        let routed = outcome.routed_to.unwrap();
        assert!(routed.starts_with(&config.processed_folder));
        assert!(routed.exists());
    }

    #[test]
    fn failure_routes_to_failed_folder_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, config) = sink_in(dir.path());
        let mut job = finished_job(&config, "broken.csv");
        job.error = Some("step 'upload' failed".to_string());
        job.attempt = 2;
        job.advance(JobState::Failed);

        let outcome = sink.record_failure(&job).unwrap();

        assert_eq!(outcome.kind, OutcomeKind::Failed);
        assert_eq!(outcome.attempts, 2);
        assert!(outcome.routed_to.unwrap().starts_with(&config.failed_folder));

        let body = fs::read_to_string(outcome.report_path.unwrap()).unwrap();
        assert!(body.contains("\"failed\""));
        assert!(body.contains("step 'upload' failed"));
    }

    #[test]
    fn delete_switch_removes_instead_of_moving() {
        let dir = tempfile::tempdir().unwrap();
        let (_, config) = sink_in(dir.path());
        let config = Config {
            delete_after_processing: true,
            ..config
        };
        let sink = ReportSink::new(&config);
        let mut job = finished_job(&config, "gone.xls");
        job.advance(JobState::Succeeded);

        let outcome = sink.record_success(&job, b"").unwrap();
        assert!(outcome.routed_to.is_none());
        assert!(!job.event.path.exists());
    }
}
