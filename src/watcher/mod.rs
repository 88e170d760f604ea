//! File arrival watcher.
//!
//! Wraps a notify backend (native, with a polling fallback for network
//! shares) and turns raw filesystem events into debounced, deduplicated
//! [`FileEvent`]s on a bounded channel. The channel bound is the
//! backpressure: when every slot is taken the watcher thread blocks
//! instead of spawning work.

pub mod debounce;

use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use notify::{
    Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode,
    Watcher,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::models::FileEvent;

pub use debounce::{is_file_stable, DebounceGate};

#[derive(Debug)]
enum WatchBackend {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

/// Keeps the notify backend alive. Dropping it stops the watch loop and
/// closes the event channel.
#[derive(Debug)]
pub struct WatcherGuard {
    _backend: WatchBackend,
    _pump: JoinHandle<()>,
}

/// Observes one folder (non-recursive) for qualifying spreadsheet files.
pub struct FileWatcher;

impl FileWatcher {
    /// Start watching the configured shared folder.
    ///
    /// Fails fast with a configuration error when the folder is missing.
    /// Pre-existing files are swept once at startup so arrivals during
    /// downtime are not lost.
    pub fn start(config: Arc<Config>) -> Result<(mpsc::Receiver<FileEvent>, WatcherGuard)> {
        let folder = config.shared_folder.clone();
        if !folder.is_dir() {
            return Err(ConfigError::FolderMissing { path: folder }.into());
        }

        let (events_tx, events_rx) = mpsc::channel::<FileEvent>(config.watch_channel_capacity);
        let (raw_tx, raw_rx) = std_mpsc::channel::<notify::Result<Event>>();

        let mut backend = Self::build_backend(&config, raw_tx)?;
        match &mut backend {
            WatchBackend::Native(w) => w.watch(&folder, RecursiveMode::NonRecursive)?,
            WatchBackend::Poll(w) => w.watch(&folder, RecursiveMode::NonRecursive)?,
        }
        info!("🚀 watching folder: {}", folder.display());
        info!(
            "   📝 extensions: {:?} | debounce: {}ms",
            config.allowed_extensions, config.debounce_ms
        );

        let pump = tokio::task::spawn_blocking(move || {
            pump_events(config, folder, raw_rx, events_tx);
        });

        Ok((
            events_rx,
            WatcherGuard {
                _backend: backend,
                _pump: pump,
            },
        ))
    }

    fn build_backend(
        config: &Config,
        raw_tx: std_mpsc::Sender<notify::Result<Event>>,
    ) -> Result<WatchBackend> {
        let poll_config = NotifyConfig::default()
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms));

        if config.force_poll_watcher {
            info!("polling backend forced by configuration");
            let watcher = PollWatcher::new(raw_tx, poll_config)?;
            return Ok(WatchBackend::Poll(watcher));
        }

        match RecommendedWatcher::new(raw_tx.clone(), NotifyConfig::default()) {
            Ok(watcher) => Ok(WatchBackend::Native(watcher)),
            Err(native_err) => {
                // Native backends can fail on UNC/SMB shares; fall back.
                warn!("⚠️ native watcher unavailable → polling: {}", native_err);
                let watcher = PollWatcher::new(raw_tx, poll_config)?;
                Ok(WatchBackend::Poll(watcher))
            }
        }
    }
}

/// Blocking loop: initial sweep, then raw events → gate → bounded channel.
/// Ends when the backend is dropped (raw channel disconnects) or the
/// consumer goes away.
fn pump_events(
    config: Arc<Config>,
    folder: PathBuf,
    raw_rx: std_mpsc::Receiver<notify::Result<Event>>,
    events_tx: mpsc::Sender<FileEvent>,
) {
    let mut gate = DebounceGate::new(config);

    // Sweep files that were already sitting in the folder.
    let mut swept = 0usize;
    match std::fs::read_dir(&folder) {
        Ok(entries) => {
            for entry in entries.flatten() {
                if let Some(event) = gate.evaluate(&entry.path()) {
                    info!("🔎 initial sweep: {}", event.file_name());
                    if events_tx.blocking_send(event).is_err() {
                        return;
                    }
                    swept += 1;
                }
            }
        }
        Err(e) => warn!("⚠️ initial sweep failed: {}", e),
    }
    if swept > 0 {
        info!("✓ initial sweep queued {} file(s)", swept);
    }

    while let Ok(raw) = raw_rx.recv() {
        let event = match raw {
            Ok(event) => event,
            Err(e) => {
                // Transient backend hiccup; the watch itself survives.
                warn!("⚠️ watch event error: {}", e);
                continue;
            }
        };
        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
        ) {
            continue;
        }
        for path in event.paths {
            if let Some(file_event) = gate.evaluate(&path) {
                info!(
                    "📥 detected: {} ({} bytes)",
                    file_event.file_name(),
                    file_event.size
                );
                if events_tx.blocking_send(file_event).is_err() {
                    debug!("event consumer gone, stopping watch loop");
                    return;
                }
            }
        }
    }
    debug!("⏹️ watch backend dropped, stopping");
}
