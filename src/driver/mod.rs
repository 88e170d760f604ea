//! Browser automation driver seam.
//!
//! The coordinator only ever talks to the [`Driver`] trait; the production
//! implementation lives in [`chromium`]. Every call may block and may fail,
//! and a session is never reused across retries — the coordinator asks the
//! [`DriverFactory`] for a fresh one per attempt and always closes it.

pub mod chromium;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::selectors::SelectorEntry;

pub use chromium::{ChromiumDriver, ChromiumFactory};

/// Opaque handle to a located element. Drivers re-resolve by selector, so
/// a handle stays valid across page mutations as long as the selector does.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    pub entry: SelectorEntry,
}

/// One live browser automation session.
#[async_trait]
pub trait Driver: Send {
    /// Navigate the session to `url`.
    async fn open(&mut self, url: &str) -> Result<()>;

    /// Resolve a catalog entry against the live page.
    async fn locate(&mut self, entry: &SelectorEntry) -> Result<ElementHandle>;

    /// Type a value into an input, firing input/change events.
    async fn fill(&mut self, handle: &ElementHandle, value: &str) -> Result<()>;

    async fn click(&mut self, handle: &ElementHandle) -> Result<()>;

    /// Choose an option in a `<select>`: exact value first, then label,
    /// then the first enabled non-empty option.
    async fn select_option(&mut self, handle: &ElementHandle, preferred: &str) -> Result<()>;

    /// Attach a local file to a file input.
    async fn upload(&mut self, handle: &ElementHandle, file: &Path) -> Result<()>;

    /// Wait until the entry matches something, up to `timeout`. Returns
    /// `Ok(false)` on expiry; the caller decides whether that is fatal.
    async fn wait_for(&mut self, entry: &SelectorEntry, timeout: Duration) -> Result<bool>;

    /// Capture a result artifact (page screenshot) as raw bytes.
    async fn capture(&mut self) -> Result<Vec<u8>>;

    /// Tear the session down. Must be called on every exit path.
    async fn close(&mut self) -> Result<()>;
}

/// Creates a fresh session per job attempt.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn Driver>>;
}
