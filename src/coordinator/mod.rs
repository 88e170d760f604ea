//! Processing coordinator.
//!
//! Consumes arrival events and drives each one to a terminal outcome:
//!
//! 1. take the per-path lock (duplicates are discarded, not errored)
//! 2. under a concurrency permit, run the browser step sequence with a
//!    fresh session per attempt, retrying with backoff
//! 3. record the outcome and route the source file
//! 4. release the lock on every exit path, including panics and shutdown
//!
//! The per-path lock serializes jobs for the same file while unrelated
//! paths run in parallel, bounded by the semaphore.

pub mod lock_table;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::driver::{Driver, DriverFactory};
use crate::error::{AutomationError, Result};
use crate::models::{FileEvent, JobOutcome, JobState, OutcomeKind, ProcessingJob};
use crate::report::ReportSink;
use crate::selectors::SelectorCatalog;

pub use lock_table::{LockTable, PathGuard};

/// Totals across one coordinator run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub succeeded: usize,
    pub failed: usize,
    pub duplicates: usize,
}

impl CoordinatorStats {
    fn absorb(&mut self, joined: std::result::Result<JobOutcome, tokio::task::JoinError>) {
        match joined {
            Ok(outcome) => match outcome.kind {
                OutcomeKind::Succeeded => self.succeeded += 1,
                OutcomeKind::Failed => self.failed += 1,
                OutcomeKind::Duplicate => self.duplicates += 1,
            },
            Err(e) => {
                error!("job task failed to join: {}", e);
                self.failed += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.duplicates
    }
}

/// Owns the event loop and the per-path lock table.
pub struct Coordinator {
    config: Arc<Config>,
    catalog: Arc<SelectorCatalog>,
    factory: Arc<dyn DriverFactory>,
    sink: Arc<ReportSink>,
    locks: LockTable,
    shutdown: watch::Receiver<bool>,
}

impl Coordinator {
    pub fn new(
        config: Arc<Config>,
        catalog: Arc<SelectorCatalog>,
        factory: Arc<dyn DriverFactory>,
        sink: Arc<ReportSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            catalog,
            factory,
            sink,
            locks: LockTable::new(),
            shutdown,
        }
    }

    /// Consume arrival events until the channel closes or shutdown fires,
    /// then wait for in-flight jobs and return the totals.
    pub async fn run(&self, mut events: mpsc::Receiver<FileEvent>) -> CoordinatorStats {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs.max(1)));
        let mut tasks: JoinSet<JobOutcome> = JoinSet::new();
        let mut stats = CoordinatorStats::default();
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => {
                        // Duplicate check happens before queueing for a
                        // permit so a duplicate never waits on a slot.
                        let guard = match self.locks.try_acquire(&event.path) {
                            Some(guard) => guard,
                            None => {
                                info!(
                                    "ℹ️ duplicate arrival discarded: {} (job still active)",
                                    event.file_name()
                                );
                                stats.absorb(Ok(JobOutcome::duplicate(event.path)));
                                continue;
                            }
                        };
                        let permit = match semaphore.clone().acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };

                        info!("🎯 job admitted: {}", event.file_name());
                        let config = Arc::clone(&self.config);
                        let catalog = Arc::clone(&self.catalog);
                        let factory = Arc::clone(&self.factory);
                        let sink = Arc::clone(&self.sink);
                        let job_shutdown = self.shutdown.clone();
                        tasks.spawn(async move {
                            let _permit = permit;
                            run_job(config, catalog, factory, sink, guard, event, job_shutdown)
                                .await
                        });
                    }
                    None => break,
                },
                _ = shutdown.changed() => {
                    info!("⏹️ shutdown requested, draining in-flight jobs");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    stats.absorb(joined);
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            stats.absorb(joined);
        }
        stats
    }
}

/// Drive one job to a terminal outcome. Owns the path guard for its whole
/// lifetime; the guard (and with it the lock) is released on every exit
/// path, including cancellation and panic unwinds.
pub async fn run_job(
    config: Arc<Config>,
    catalog: Arc<SelectorCatalog>,
    factory: Arc<dyn DriverFactory>,
    sink: Arc<ReportSink>,
    guard: PathGuard,
    event: FileEvent,
    mut shutdown: watch::Receiver<bool>,
) -> JobOutcome {
    let mut job = ProcessingJob::new(event);
    job.advance(JobState::Locked);

    let max_attempts = config.max_attempts.max(1);
    let mut outcome: Option<JobOutcome> = None;

    'attempts: for attempt in 1..=max_attempts {
        if attempt > 1 {
            info!(
                "[{}] 🔁 retry {}/{} after {}ms",
                job.event.file_name(),
                attempt,
                max_attempts,
                config.retry_delay_ms
            );
            tokio::select! {
                _ = sleep(config.retry_delay()) => {}
                _ = shutdown.changed() => {
                    job.error = Some(AutomationError::Cancelled.to_string());
                    break 'attempts;
                }
            }
            // A retry restarts from LOCKED with a fresh session.
            job.advance(JobState::Locked);
        }
        job.attempt = attempt;
        job.advance(JobState::Running);

        let attempt_result = run_attempt(
            factory.as_ref(),
            &config,
            &catalog,
            &job.event.path,
            &mut shutdown,
        )
        .await;

        match attempt_result {
            Ok(artifact) => {
                info!(
                    "[{}] ✅ succeeded on attempt {}/{}",
                    job.event.file_name(),
                    attempt,
                    max_attempts
                );
                job.advance(JobState::Succeeded);
                outcome = Some(record_success(&sink, &job, &artifact));
                break 'attempts;
            }
            Err(e) => {
                warn!(
                    "[{}] ⚠️ attempt {}/{} failed: {}",
                    job.event.file_name(),
                    attempt,
                    max_attempts,
                    e
                );
                job.error = Some(e.to_string());
                if !e.is_retryable() {
                    break 'attempts;
                }
            }
        }
    }

    let outcome = outcome.unwrap_or_else(|| {
        job.advance(JobState::Failed);
        record_failure(&sink, &job)
    });

    job.advance(JobState::Released);
    drop(guard);
    outcome
}

/// One attempt: fresh session in, session closed on the way out no matter
/// what the steps did. Cancellation abandons the steps, not the teardown:
/// shutdown turns the attempt into `Cancelled` and still closes the session.
async fn run_attempt(
    factory: &dyn DriverFactory,
    config: &Config,
    catalog: &SelectorCatalog,
    file: &Path,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Vec<u8>> {
    let mut driver = factory.create().await?;
    let result = tokio::select! {
        result = drive_steps(driver.as_mut(), config, catalog, file) => result,
        _ = shutdown.changed() => {
            warn!("⏹️ cancelled mid-attempt: {}", file.display());
            Err(AutomationError::Cancelled.into())
        }
    };
    if let Err(e) = driver.close().await {
        warn!("⚠️ session close failed: {}", e);
    }
    result
}

/// The fixed step sequence: (login) → open analysis page → selects →
/// attach file → start → wait for confirmation → capture artifact.
async fn drive_steps(
    driver: &mut dyn Driver,
    config: &Config,
    catalog: &SelectorCatalog,
    file: &Path,
) -> Result<Vec<u8>> {
    if config.has_credentials() {
        login(driver, config, catalog).await?;
    }
    driver.open(&config.analysis_url()).await?;

    // The parameter/service selects are not present on every UI variant;
    // a missing element is tolerated, a failing selection is not.
    for (key, preferred) in [
        ("parameter_select", config.default_parameter.as_str()),
        ("service_select", config.default_service.as_str()),
    ] {
        if !catalog.contains("analysis", key) {
            continue;
        }
        let entry = catalog.get("analysis", key)?;
        match driver.locate(entry).await {
            Ok(handle) => driver.select_option(&handle, preferred).await?,
            Err(e) => warn!("⚠️ {} not found, skipping: {}", key, e),
        }
    }

    let upload_entry = catalog.get("analysis", "upload_input")?;
    let upload_handle = driver.locate(upload_entry).await?;
    driver.upload(&upload_handle, file).await?;

    let start_entry = catalog.get("analysis", "start_button")?;
    let start_handle = driver.locate(start_entry).await?;
    driver.click(&start_handle).await?;

    let confirmation = catalog.get("analysis", "confirmation")?;
    let confirmed = driver.wait_for(confirmation, config.step_timeout()).await?;
    if !confirmed {
        return Err(AutomationError::StepTimeout {
            step: "confirmation",
            waited_ms: config.step_timeout_ms,
        }
        .into());
    }
    info!("▶️ upload confirmed by the page");

    driver.capture().await
}

/// Authenticate the session: fill the login form, submit, and wait for a
/// logged-in probe to appear.
async fn login(
    driver: &mut dyn Driver,
    config: &Config,
    catalog: &SelectorCatalog,
) -> Result<()> {
    info!("🔐 authenticating...");
    driver.open(&config.login_url()).await?;

    let username = catalog.get("login", "username_input")?;
    let handle = driver.locate(username).await?;
    driver
        .fill(&handle, config.username.as_deref().unwrap_or_default())
        .await?;

    let password = catalog.get("login", "password_input")?;
    let handle = driver.locate(password).await?;
    driver
        .fill(&handle, config.password.as_deref().unwrap_or_default())
        .await?;

    let submit = catalog.get("login", "submit_button")?;
    let handle = driver.locate(submit).await?;
    driver.click(&handle).await?;

    let probe = catalog.get("login", "logged_in_probe")?;
    if !driver.wait_for(probe, config.login_timeout()).await? {
        return Err(AutomationError::StepTimeout {
            step: "login",
            waited_ms: config.login_timeout_ms,
        }
        .into());
    }
    info!("✅ session authenticated");
    Ok(())
}

fn record_success(sink: &ReportSink, job: &ProcessingJob, artifact: &[u8]) -> JobOutcome {
    match sink.record_success(job, artifact) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("[{}] report sink failed: {}", job.event.file_name(), e);
            JobOutcome {
                kind: OutcomeKind::Succeeded,
                path: job.event.path.clone(),
                attempts: job.attempt,
                reason: None,
                report_path: None,
                routed_to: None,
            }
        }
    }
}

fn record_failure(sink: &ReportSink, job: &ProcessingJob) -> JobOutcome {
    match sink.record_failure(job) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("[{}] report sink failed: {}", job.event.file_name(), e);
            JobOutcome {
                kind: OutcomeKind::Failed,
                path: job.event.path.clone(),
                attempts: job.attempt,
                reason: job.error.clone(),
                report_path: None,
                routed_to: None,
            }
        }
    }
}
