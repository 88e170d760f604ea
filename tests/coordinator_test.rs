//! Coordinator behavior against a scripted driver stub: terminal outcomes,
//! duplicate suppression, lock release under failure, retry accounting,
//! cancellation, and the full drop-a-file scenario.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{sleep, timeout};

use sheet_upload_bot::coordinator::{run_job, Coordinator, LockTable};
use sheet_upload_bot::driver::{Driver, DriverFactory, ElementHandle};
use sheet_upload_bot::error::{AppError, Result};
use sheet_upload_bot::models::{FileEvent, OutcomeKind};
use sheet_upload_bot::report::ReportSink;
use sheet_upload_bot::selectors::{SelectorCatalog, SelectorEntry};
use sheet_upload_bot::Config;

// ========== scripted driver stub ==========

#[derive(Clone)]
enum Behavior {
    Succeed,
    FailLaunch,
    FailOpen,
    FailLocate,
    FailClick,
    FailSelect,
    FailUpload,
    FailCapture,
    /// Confirmation wait expires without the element appearing
    Timeout,
    /// Confirmation wait blocks until notified
    Block(Arc<Notify>),
}

#[derive(Default)]
struct SessionLog {
    steps: Vec<String>,
    closed: bool,
}

struct StubDriver {
    behavior: Behavior,
    log: Arc<Mutex<SessionLog>>,
}

fn injected(step: &'static str) -> AppError {
    AppError::step_failed(step, std::io::Error::other("injected fault"))
}

impl StubDriver {
    fn record(&self, step: impl Into<String>) {
        self.log.lock().unwrap().steps.push(step.into());
    }
}

#[async_trait]
impl Driver for StubDriver {
    async fn open(&mut self, url: &str) -> Result<()> {
        self.record(format!("open {}", url));
        if matches!(self.behavior, Behavior::FailOpen) {
            return Err(injected("open"));
        }
        Ok(())
    }

    async fn locate(&mut self, entry: &SelectorEntry) -> Result<ElementHandle> {
        self.record(format!("locate {}", entry.selector));
        if matches!(self.behavior, Behavior::FailLocate) {
            return Err(injected("locate"));
        }
        Ok(ElementHandle {
            entry: entry.clone(),
        })
    }

    async fn fill(&mut self, _handle: &ElementHandle, _value: &str) -> Result<()> {
        self.record("fill");
        Ok(())
    }

    async fn click(&mut self, _handle: &ElementHandle) -> Result<()> {
        self.record("click");
        if matches!(self.behavior, Behavior::FailClick) {
            return Err(injected("click"));
        }
        Ok(())
    }

    async fn select_option(&mut self, _handle: &ElementHandle, preferred: &str) -> Result<()> {
        self.record(format!("select {}", preferred));
        if matches!(self.behavior, Behavior::FailSelect) {
            return Err(injected("select"));
        }
        Ok(())
    }

    async fn upload(&mut self, _handle: &ElementHandle, file: &Path) -> Result<()> {
        self.record(format!("upload {}", file.display()));
        if matches!(self.behavior, Behavior::FailUpload) {
            return Err(injected("upload"));
        }
        Ok(())
    }

    async fn wait_for(&mut self, entry: &SelectorEntry, _timeout: Duration) -> Result<bool> {
        self.record(format!("wait_for {}", entry.selector));
        match &self.behavior {
            Behavior::Timeout => Ok(false),
            Behavior::Block(notify) => {
                notify.notified().await;
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    async fn capture(&mut self) -> Result<Vec<u8>> {
        self.record("capture");
        if matches!(self.behavior, Behavior::FailCapture) {
            return Err(injected("capture"));
        }
        Ok(b"artifact-bytes".to_vec())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Hands out one scripted session per attempt; the last behavior repeats.
struct StubFactory {
    behaviors: Vec<Behavior>,
    sessions: Arc<Mutex<Vec<Arc<Mutex<SessionLog>>>>>,
}

impl StubFactory {
    fn new(behaviors: Vec<Behavior>) -> Arc<Self> {
        Arc::new(Self {
            behaviors,
            sessions: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn session(&self, index: usize) -> Arc<Mutex<SessionLog>> {
        Arc::clone(&self.sessions.lock().unwrap()[index])
    }
}

#[async_trait]
impl DriverFactory for StubFactory {
    async fn create(&self) -> Result<Box<dyn Driver>> {
        let index = self.sessions.lock().unwrap().len();
        let behavior = self
            .behaviors
            .get(index)
            .or_else(|| self.behaviors.last())
            .cloned()
            .unwrap_or(Behavior::Succeed);
        if matches!(behavior, Behavior::FailLaunch) {
            // Count the launch attempt even though no session exists.
            self.sessions
                .lock()
                .unwrap()
                .push(Arc::new(Mutex::new(SessionLog::default())));
            return Err(injected("launch"));
        }
        let log = Arc::new(Mutex::new(SessionLog::default()));
        self.sessions.lock().unwrap().push(Arc::clone(&log));
        Ok(Box::new(StubDriver {
            behavior,
            log,
        }))
    }
}

// ========== fixtures ==========

struct Fixture {
    _dir: tempfile::TempDir,
    config: Arc<Config>,
    catalog: Arc<SelectorCatalog>,
    sink: Arc<ReportSink>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        base_url: "http://localhost:5002".to_string(),
        shared_folder: dir.path().join("shared"),
        processed_folder: dir.path().join("processed"),
        failed_folder: dir.path().join("failed"),
        reports_folder: dir.path().join("reports"),
        screenshots_folder: dir.path().join("screenshots"),
        logs_folder: dir.path().join("logs"),
        max_attempts: 2,
        retry_delay_ms: 10,
        step_timeout_ms: 100,
        ..Config::default()
    };
    config.ensure_directories_exist().unwrap();
    let sink = ReportSink::new(&config);
    Fixture {
        _dir: dir,
        config: Arc::new(config),
        catalog: Arc::new(SelectorCatalog::default()),
        sink: Arc::new(sink),
    }
}

fn drop_file(fixture: &Fixture, name: &str) -> FileEvent {
    let path = fixture.config.shared_folder.join(name);
    std::fs::write(&path, b"col_a,col_b\n1,2\n").unwrap();
    FileEvent::new(&path, 16)
}

async fn run_one(
    fixture: &Fixture,
    factory: Arc<StubFactory>,
    event: FileEvent,
) -> (sheet_upload_bot::JobOutcome, LockTable) {
    let locks = LockTable::new();
    let guard = locks.try_acquire(&event.path).unwrap();
    let (_tx, rx) = watch::channel(false);
    let outcome = run_job(
        Arc::clone(&fixture.config),
        Arc::clone(&fixture.catalog),
        factory,
        Arc::clone(&fixture.sink),
        guard,
        event,
        rx,
    )
    .await;
    (outcome, locks)
}

// ========== tests ==========

#[tokio::test]
async fn distinct_paths_each_reach_one_terminal_outcome() {
    let fixture = fixture();
    let factory = StubFactory::new(vec![Behavior::Succeed]);
    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let coordinator = Coordinator::new(
        Arc::clone(&fixture.config),
        Arc::clone(&fixture.catalog),
        factory.clone() as Arc<dyn DriverFactory>,
        Arc::clone(&fixture.sink),
        shutdown_rx,
    );

    for name in ["a.xlsx", "b.csv", "c.xls"] {
        tx.send(drop_file(&fixture, name)).await.unwrap();
    }
    drop(tx);

    let stats = coordinator.run(rx).await;
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.duplicates, 0);
    for stem in ["a", "b", "c"] {
        assert!(fixture.sink.report_path_for(stem).exists());
    }
}

#[tokio::test]
async fn duplicate_arrival_is_discarded_without_a_second_session() {
    let fixture = fixture();
    let gate = Arc::new(Notify::new());
    let factory = StubFactory::new(vec![Behavior::Block(Arc::clone(&gate))]);
    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let coordinator = Coordinator::new(
        Arc::clone(&fixture.config),
        Arc::clone(&fixture.catalog),
        factory.clone() as Arc<dyn DriverFactory>,
        Arc::clone(&fixture.sink),
        shutdown_rx,
    );

    let event = drop_file(&fixture, "same.xlsx");
    let duplicate = event.clone();
    let runner = tokio::spawn(async move { coordinator.run(rx).await });

    tx.send(event).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    // First job is blocked inside its confirmation wait; same path again.
    tx.send(duplicate).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    gate.notify_one();
    drop(tx);

    let stats = timeout(Duration::from_secs(5), runner).await.unwrap().unwrap();
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(factory.session_count(), 1, "duplicate must not open a session");
}

#[tokio::test]
async fn lock_is_released_after_a_fault_at_every_step() {
    let faults = [
        Behavior::FailLaunch,
        Behavior::FailOpen,
        Behavior::FailLocate,
        Behavior::FailSelect,
        Behavior::FailUpload,
        Behavior::FailClick,
        Behavior::Timeout,
        Behavior::FailCapture,
    ];
    for (i, fault) in faults.into_iter().enumerate() {
        let fixture = fixture();
        let opened_session = !matches!(fault, Behavior::FailLaunch);
        let factory = StubFactory::new(vec![fault]);
        let event = drop_file(&fixture, &format!("fault_{}.xlsx", i));
        let path = event.path.clone();

        let (outcome, locks) = run_one(&fixture, factory.clone(), event).await;

        assert_eq!(outcome.kind, OutcomeKind::Failed, "fault case {}", i);
        assert!(!locks.is_locked(&path), "lock leaked in fault case {}", i);
        assert!(outcome.routed_to.unwrap().starts_with(&fixture.config.failed_folder));
        if opened_session {
            // Every opened session was torn down, every attempt.
            for s in 0..factory.session_count() {
                assert!(
                    factory.session(s).lock().unwrap().closed,
                    "session {} not closed in fault case {}",
                    s,
                    i
                );
            }
        }
    }
}

#[tokio::test]
async fn failing_all_attempts_records_the_configured_attempt_count() {
    let fixture = fixture();
    let factory = StubFactory::new(vec![Behavior::FailOpen, Behavior::FailOpen]);
    let event = drop_file(&fixture, "always_failing.xlsx");

    let (outcome, _locks) = run_one(&fixture, factory.clone(), event).await;

    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(factory.session_count(), 2, "one fresh session per attempt");
    let body = std::fs::read_to_string(outcome.report_path.unwrap()).unwrap();
    assert!(body.contains("\"attempts\": 2"));
}

#[tokio::test]
async fn success_on_second_attempt_records_two_attempts() {
    let fixture = fixture();
    let factory = StubFactory::new(vec![Behavior::Timeout, Behavior::Succeed]);
    let event = drop_file(&fixture, "flaky.xlsx");

    let (outcome, _locks) = run_one(&fixture, factory.clone(), event).await;

    assert_eq!(outcome.kind, OutcomeKind::Succeeded);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(factory.session_count(), 2);
    assert!(factory.session(0).lock().unwrap().closed);
    assert!(factory.session(1).lock().unwrap().closed);
}

#[tokio::test]
async fn cancellation_reaches_a_terminal_state_and_frees_the_lock() {
    let fixture = fixture();
    let gate = Arc::new(Notify::new());
    let factory = StubFactory::new(vec![Behavior::Block(Arc::clone(&gate))]);
    let event = drop_file(&fixture, "cancelled.xlsx");
    let path = event.path.clone();

    let locks = LockTable::new();
    let guard = locks.try_acquire(&path).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let config = Arc::clone(&fixture.config);
    let catalog = Arc::clone(&fixture.catalog);
    let sink = Arc::clone(&fixture.sink);
    let spawned_factory = factory.clone();
    let job = tokio::spawn(async move {
        run_job(
            config,
            catalog,
            spawned_factory as Arc<dyn DriverFactory>,
            sink,
            guard,
            event,
            shutdown_rx,
        )
        .await
    });

    sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();

    let outcome = timeout(Duration::from_secs(5), job).await.unwrap().unwrap();
    assert_eq!(outcome.kind, OutcomeKind::Failed);
    assert!(outcome.reason.unwrap().contains("cancelled"));
    assert!(!locks.is_locked(&path), "cancelled job leaked its lock");
    // Cancellation abandons the in-flight steps but not the teardown.
    assert_eq!(factory.session_count(), 1);
    assert!(
        factory.session(0).lock().unwrap().closed,
        "cancelled attempt left its session open"
    );
}

#[tokio::test]
async fn credentials_trigger_the_login_steps_first() {
    let fixture = fixture();
    let config = Config {
        username: Some("operator".to_string()),
        password: Some("hunter2".to_string()),
        ..(*fixture.config).clone()
    };
    let fixture = Fixture {
        config: Arc::new(config),
        ..fixture
    };
    let factory = StubFactory::new(vec![Behavior::Succeed]);
    let event = drop_file(&fixture, "with_login.xlsx");

    let (outcome, _locks) = run_one(&fixture, factory.clone(), event).await;

    assert_eq!(outcome.kind, OutcomeKind::Succeeded);
    let log = factory.session(0);
    let steps = log.lock().unwrap().steps.clone();
    assert!(steps[0].starts_with("open http://localhost:5002/login"));
    assert_eq!(steps.iter().filter(|s| s.as_str() == "fill").count(), 2);
    let upload_pos = steps.iter().position(|s| s.starts_with("upload")).unwrap();
    let login_open = steps.iter().position(|s| s.contains("/login")).unwrap();
    assert!(login_open < upload_pos);
}

#[tokio::test]
async fn end_to_end_drop_one_spreadsheet() {
    let fixture = fixture();
    let factory = StubFactory::new(vec![Behavior::Succeed]);
    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let coordinator = Coordinator::new(
        Arc::clone(&fixture.config),
        Arc::clone(&fixture.catalog),
        factory.clone() as Arc<dyn DriverFactory>,
        Arc::clone(&fixture.sink),
        shutdown_rx,
    );

    let event = drop_file(&fixture, "report_2024.xlsx");
    let source = event.path.clone();
    tx.send(event).await.unwrap();
    drop(tx);

    let stats = coordinator.run(rx).await;
    assert_eq!(stats.succeeded, 1);

    // Deterministic report name derived from the source file name.
    let report = fixture.sink.report_path_for("report_2024");
    assert!(report.exists());
    let body = std::fs::read_to_string(&report).unwrap();
    assert!(body.contains("\"succeeded\""));
    assert!(body.contains("report_2024.xlsx"));

    // Screenshot artifact captured by the driver.
    assert!(fixture
        .config
        .screenshots_folder
        .join("report_2024.png")
        .exists());

    // Source file left the shared folder for processed/.
    assert!(!source.exists());
    let moved: Vec<PathBuf> = std::fs::read_dir(&fixture.config.processed_folder)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(moved.len(), 1);
    assert!(moved[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("report_2024_"));
}
