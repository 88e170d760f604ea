//! # Sheet Upload Bot
//!
//! Watches a shared folder for spreadsheet/CSV arrivals and processes each
//! one through a browser automation session against a web UI: open the
//! upload page, attach the file, start the analysis, wait for the page to
//! confirm, then archive the source and write a report.
//!
//! ## Architecture
//!
//! Layered, leaves first:
//!
//! - `config` / `selectors` — immutable runtime settings and the page →
//!   element-key → CSS/XPath catalog, both JSON with `{{VAR}}` env
//!   substitution in the config document
//! - `watcher` — notify-backed folder watch with debounce, dedupe and a
//!   bounded arrival channel
//! - `driver` — the browser session seam; `ChromiumFactory` launches one
//!   chromiumoxide session per job attempt
//! - `coordinator` — the stateful core: per-path locking, bounded
//!   concurrency, retry with fresh sessions, cancellation to a terminal
//!   state on shutdown
//! - `report` — terminal outcome reports, screenshot artifacts and
//!   processed/failed routing of the source file

pub mod app;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod models;
pub mod report;
pub mod selectors;
pub mod utils;
pub mod watcher;

// Re-export the types most callers need
pub use app::App;
pub use config::Config;
pub use coordinator::{run_job, Coordinator, CoordinatorStats, LockTable, PathGuard};
pub use driver::{Driver, DriverFactory, ElementHandle};
pub use error::{AppError, Result};
pub use models::{FileEvent, JobOutcome, JobState, OutcomeKind, ProcessingJob};
pub use report::ReportSink;
pub use selectors::{SelectorCatalog, SelectorEntry, SelectorKind};
pub use watcher::FileWatcher;
