//! Logging setup and banner helpers.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::coordinator::CoordinatorStats;
use crate::error::{ConfigError, Result};

/// Initialize the tracing subscriber. `RUST_LOG` wins over the default
/// `info` level. Safe to call more than once (tests).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Start the append-only session log file with a dated header.
pub fn init_log_file(logs_folder: &Path, app_name: &str) -> Result<PathBuf> {
    let path = logs_folder.join(format!("{}.log", app_name));
    let header = format!(
        "{}\n{} session - {}\n{}\n\n",
        "=".repeat(60),
        app_name,
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(&path, header).map_err(|e| ConfigError::ReadFailed {
        path: path.clone(),
        source: Box::new(e),
    })?;
    Ok(path)
}

/// Startup banner.
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 {} starting", config.app_name);
    info!("🌍 environment: {}", config.environment);
    info!("🌐 base URL: {}", config.base_url);
    info!("📁 watched folder: {}", config.shared_folder.display());
    info!(
        "📊 max concurrent jobs: {} | attempts per job: {}",
        config.max_concurrent_jobs, config.max_attempts
    );
    info!("{}", "=".repeat(60));
}

/// Final totals, printed once the event loop ends.
pub fn print_final_stats(stats: &CoordinatorStats) {
    info!("\n{}", "=".repeat(60));
    info!("📊 session totals");
    info!(
        "finished at: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("✅ succeeded: {}", stats.succeeded);
    info!("❌ failed: {}", stats.failed);
    info!("ℹ️ duplicates discarded: {}", stats.duplicates);
    info!("{}", "=".repeat(60));
}
