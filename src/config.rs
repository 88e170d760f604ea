//! Runtime configuration.
//!
//! Settings come from three layers, later layers winning:
//! 1. `Config::default()`
//! 2. a JSON document (`config/config.json`) with `{{VAR}}` placeholders
//!    resolved against the environment
//! 3. plain environment variable overrides

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, Result};

/// Program configuration. Built once at startup, immutable afterwards, and
/// passed by reference into every component.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name used in banners and reports
    pub app_name: String,
    /// Execution environment label (development/production)
    pub environment: String,
    /// Base URL of the target web application
    pub base_url: String,
    /// Login page URL; derived from `base_url` when absent
    pub login_url: Option<String>,
    /// Upload/analysis page URL; derived from `base_url` when absent
    pub analysis_url: Option<String>,
    /// Folder observed for new spreadsheet files
    pub shared_folder: PathBuf,
    /// Destination for successfully processed files
    pub processed_folder: PathBuf,
    /// Destination for files whose job exhausted its retries
    pub failed_folder: PathBuf,
    /// Folder for per-job report documents
    pub reports_folder: PathBuf,
    /// Folder for captured page screenshots
    pub screenshots_folder: PathBuf,
    /// Folder for the append-only log file
    pub logs_folder: PathBuf,
    /// Accepted file extensions, lowercase with leading dot
    pub allowed_extensions: Vec<String>,
    /// Files above this size are skipped with a warning
    pub max_file_size_mb: u64,
    /// Quiet period a file must hold before it counts as fully written
    pub debounce_ms: u64,
    /// Bounded capacity of the arrival event channel
    pub watch_channel_capacity: usize,
    /// Force the polling watcher backend (useful on SMB/UNC shares)
    pub force_poll_watcher: bool,
    /// Poll interval for the polling backend
    pub poll_interval_ms: u64,
    /// Run the browser headless
    pub headless: bool,
    /// Explicit browser binary; auto-detected when absent
    pub chrome_executable: Option<PathBuf>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Timeout for page navigations
    pub navigation_timeout_ms: u64,
    /// Timeout for a single wait-for-selector step
    pub step_timeout_ms: u64,
    /// Timeout for the post-login confirmation probe
    pub login_timeout_ms: u64,
    /// Upper bound on concurrently running jobs
    pub max_concurrent_jobs: usize,
    /// Attempts per job before it is declared failed
    pub max_attempts: u32,
    /// Delay between attempts
    pub retry_delay_ms: u64,
    /// Move terminal files out of the shared folder
    pub move_processed_files: bool,
    /// Delete instead of moving (wins over `move_processed_files`)
    pub delete_after_processing: bool,
    /// Preferred value for the analysis parameter <select>
    pub default_parameter: String,
    /// Preferred value for the service <select>
    pub default_service: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Optional selector catalog document; built-in defaults when absent
    pub selector_catalog: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "sheet-upload-bot".to_string(),
            environment: "development".to_string(),
            base_url: String::new(),
            login_url: None,
            analysis_url: None,
            shared_folder: PathBuf::from("./data/shared"),
            processed_folder: PathBuf::from("./data/processed"),
            failed_folder: PathBuf::from("./data/failed"),
            reports_folder: PathBuf::from("./data/reports"),
            screenshots_folder: PathBuf::from("./data/screenshots"),
            logs_folder: PathBuf::from("./logs"),
            allowed_extensions: vec![".xlsx".into(), ".xls".into(), ".csv".into()],
            max_file_size_mb: 50,
            debounce_ms: 800,
            watch_channel_capacity: 64,
            force_poll_watcher: false,
            poll_interval_ms: 1000,
            headless: true,
            chrome_executable: None,
            viewport_width: 1280,
            viewport_height: 720,
            navigation_timeout_ms: 30_000,
            step_timeout_ms: 15_000,
            login_timeout_ms: 10_000,
            max_concurrent_jobs: 2,
            max_attempts: 2,
            retry_delay_ms: 2000,
            move_processed_files: true,
            delete_after_processing: false,
            default_parameter: "30".to_string(),
            default_service: "1".to_string(),
            username: None,
            password: None,
            selector_catalog: None,
        }
    }
}

impl Config {
    /// Load configuration: JSON document (when present) over defaults, then
    /// environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = PathBuf::from("config/config.json");
        let chosen = match path {
            Some(p) => Some(p.to_path_buf()),
            None if default_path.exists() => Some(default_path),
            None => None,
        };

        let mut config = match chosen {
            Some(p) => {
                info!("📄 Loading configuration from {}", p.display());
                Self::from_json_file(&p)?
            }
            None => {
                debug!("no configuration document found, using defaults");
                Self::default()
            }
        };

        config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document, resolving `{{VAR}}` placeholders against the
    /// environment before deserializing.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        let mut doc: JsonValue =
            serde_json::from_str(&raw).map_err(|e| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;

        substitute_placeholders(&mut doc);
        prune_nulls(&mut doc);

        let config: Config =
            serde_json::from_value(doc).map_err(|e| ConfigError::ParseFailed {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;
        Ok(config)
    }

    /// Environment variable overrides for the knobs most often tuned per
    /// deployment.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = env::var("LOGIN_URL") {
            self.login_url = Some(v);
        }
        if let Ok(v) = env::var("ANALYSIS_URL") {
            self.analysis_url = Some(v);
        }
        if let Ok(v) = env::var("SHARED_FOLDER") {
            self.shared_folder = PathBuf::from(v);
        }
        if let Some(v) = env::var("HEADLESS").ok().and_then(|v| v.parse().ok()) {
            self.headless = v;
        }
        if let Some(v) = env::var("MAX_CONCURRENT_JOBS").ok().and_then(|v| v.parse().ok()) {
            self.max_concurrent_jobs = v;
        }
        if let Some(v) = env::var("MAX_ATTEMPTS").ok().and_then(|v| v.parse().ok()) {
            self.max_attempts = v;
        }
        if let Some(v) = env::var("RETRY_DELAY_MS").ok().and_then(|v| v.parse().ok()) {
            self.retry_delay_ms = v;
        }
        if let Some(v) = env::var("DEBOUNCE_MS").ok().and_then(|v| v.parse().ok()) {
            self.debounce_ms = v;
        }
        if let Ok(v) = env::var("BOT_USERNAME") {
            self.username = Some(v);
        }
        if let Ok(v) = env::var("BOT_PASSWORD") {
            self.password = Some(v);
        }
        self
    }

    /// Startup validation. Failures here abort the process.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ConfigError::MissingKey {
                key: "base_url".to_string(),
            }
            .into());
        }
        if self.base_url.contains("{{") {
            return Err(ConfigError::UnresolvedPlaceholder {
                key: "base_url".to_string(),
                value: self.base_url.clone(),
            }
            .into());
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "base_url".to_string(),
                value: self.base_url.clone(),
                expected: "http(s) URL".to_string(),
            }
            .into());
        }
        if self.shared_folder.as_os_str().is_empty() {
            return Err(ConfigError::MissingKey {
                key: "shared_folder".to_string(),
            }
            .into());
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_attempts".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Create every output folder (shared, processed, failed, reports,
    /// screenshots, logs).
    pub fn ensure_directories_exist(&self) -> Result<()> {
        for dir in [
            &self.shared_folder,
            &self.processed_folder,
            &self.failed_folder,
            &self.reports_folder,
            &self.screenshots_folder,
            &self.logs_folder,
        ] {
            fs::create_dir_all(dir).map_err(|e| ConfigError::ReadFailed {
                path: dir.clone(),
                source: Box::new(e),
            })?;
            debug!("📁 folder ready: {}", dir.display());
        }
        Ok(())
    }

    // ========== derived values ==========

    pub fn login_url(&self) -> String {
        self.login_url
            .clone()
            .unwrap_or_else(|| format!("{}/login", self.base_url))
    }

    pub fn analysis_url(&self) -> String {
        self.analysis_url
            .clone()
            .unwrap_or_else(|| format!("{}/analysis", self.base_url))
    }

    pub fn has_credentials(&self) -> bool {
        self.username.as_deref().map_or(false, |u| !u.is_empty())
            && self.password.is_some()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_millis(self.login_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// True when `path` carries one of the accepted extensions.
    pub fn extension_allowed(&self, path: &Path) -> bool {
        let ext = match path.extension() {
            Some(e) => format!(".{}", e.to_string_lossy().to_lowercase()),
            None => return false,
        };
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.to_lowercase() == ext)
    }
}

// ========== placeholder substitution ==========

/// Walk a JSON tree replacing `{{VAR}}` placeholders with environment
/// values. Whole-string placeholders are coerced (bool/number/list), inline
/// ones are textually substituted. Unset variables become null and fall
/// back to defaults.
fn substitute_placeholders(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            for (_, v) in map.iter_mut() {
                substitute_placeholders(v);
            }
        }
        JsonValue::Array(items) => {
            for v in items.iter_mut() {
                substitute_placeholders(v);
            }
        }
        JsonValue::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with("{{") && trimmed.ends_with("}}") {
                let var_name = trimmed[2..trimmed.len() - 2].trim().to_string();
                *value = match env::var(&var_name) {
                    Ok(raw) => coerce_env_value(&raw),
                    Err(_) => {
                        warn!("⚠️ environment variable {} is not set", var_name);
                        JsonValue::Null
                    }
                };
            } else if s.contains("{{") {
                let re = Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap();
                let replaced = re
                    .replace_all(s, |caps: &regex::Captures<'_>| {
                        env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
                    })
                    .into_owned();
                *value = JsonValue::String(replaced);
            }
        }
        _ => {}
    }
}

/// Coerce an environment string into the closest JSON type, mirroring how
/// values are written in the document itself.
fn coerce_env_value(raw: &str) -> JsonValue {
    let lower = raw.to_lowercase();
    if lower == "true" || lower == "false" {
        return JsonValue::Bool(lower == "true");
    }
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = raw.parse::<u64>() {
            return JsonValue::Number(n.into());
        }
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return JsonValue::Number(n);
        }
    }
    if raw.contains(',') {
        return JsonValue::Array(
            raw.split(',')
                .map(|item| JsonValue::String(item.trim().to_string()))
                .collect(),
        );
    }
    JsonValue::String(raw.to_string())
}

/// Drop null members so `#[serde(default)]` fills them in.
fn prune_nulls(value: &mut JsonValue) {
    if let JsonValue::Object(map) = value {
        map.retain(|_, v| !v.is_null());
        for (_, v) in map.iter_mut() {
            prune_nulls(v);
        }
    }
}
