use std::fmt;
use std::path::PathBuf;

/// Top-level application error.
#[derive(Debug)]
pub enum AppError {
    /// Configuration problems, fatal at startup
    Config(ConfigError),
    /// Folder watching problems, per-file and non-fatal
    Watch(WatchError),
    /// Browser automation step failures, retryable per job
    Automation(AutomationError),
    /// Report/artifact persistence failures
    Report(ReportError),
    /// Wrapper for third-party errors with no better home
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "configuration error: {}", e),
            AppError::Watch(e) => write!(f, "watch error: {}", e),
            AppError::Automation(e) => write!(f, "automation error: {}", e),
            AppError::Report(e) => write!(f, "report error: {}", e),
            AppError::Other(msg) => write!(f, "error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Watch(e) => Some(e),
            AppError::Automation(e) => Some(e),
            AppError::Report(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// Configuration errors. All of these abort startup.
#[derive(Debug)]
pub enum ConfigError {
    /// A required key is absent from the JSON document and the environment
    MissingKey { key: String },
    /// A key is present but its value cannot be used
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
    /// A `{{VAR}}` placeholder survived substitution
    UnresolvedPlaceholder { key: String, value: String },
    /// The watched folder does not exist or is not a directory
    FolderMissing { path: PathBuf },
    /// Reading the configuration document failed
    ReadFailed {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The configuration document is not valid JSON
    ParseFailed {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingKey { key } => {
                write!(f, "required configuration key missing: {}", key)
            }
            ConfigError::InvalidValue {
                key,
                value,
                expected,
            } => {
                write!(
                    f,
                    "invalid value for {}: '{}' (expected {})",
                    key, value, expected
                )
            }
            ConfigError::UnresolvedPlaceholder { key, value } => {
                write!(
                    f,
                    "unresolved placeholder in {}: '{}' (check your environment variables)",
                    key, value
                )
            }
            ConfigError::FolderMissing { path } => {
                write!(f, "folder missing or unreadable: {}", path.display())
            }
            ConfigError::ReadFailed { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::ParseFailed { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed { source, .. } | ConfigError::ParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// Watcher errors. Per-file errors are logged and the file is skipped;
/// only backend startup failures are fatal.
#[derive(Debug)]
pub enum WatchError {
    /// The notify backend could not be started
    BackendFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Reading metadata for a single file failed
    FileIo {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The event channel closed while the watcher was still running
    ChannelClosed,
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchError::BackendFailed { source } => {
                write!(f, "failed to start filesystem watcher: {}", source)
            }
            WatchError::FileIo { path, source } => {
                write!(f, "failed to inspect {}: {}", path.display(), source)
            }
            WatchError::ChannelClosed => write!(f, "arrival event channel closed"),
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchError::BackendFailed { source } | WatchError::FileIo { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            WatchError::ChannelClosed => None,
        }
    }
}

/// Browser automation errors. Any of these fails the current attempt and
/// triggers the retry policy.
#[derive(Debug)]
pub enum AutomationError {
    /// Launching the browser session failed
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Navigation to a URL failed
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// The catalog has no entry for the requested page/key pair
    SelectorNotFound { page: String, key: String },
    /// The selector resolved to nothing on the live page
    ElementNotFound { selector: String },
    /// A driver step failed mid-flight
    StepFailed {
        step: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// A wait expired without the expected element appearing
    StepTimeout { step: &'static str, waited_ms: u64 },
    /// The job was cancelled by shutdown
    Cancelled,
}

impl fmt::Display for AutomationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomationError::LaunchFailed { source } => {
                write!(f, "failed to launch browser session: {}", source)
            }
            AutomationError::NavigationFailed { url, source } => {
                write!(f, "failed to navigate to {}: {}", url, source)
            }
            AutomationError::SelectorNotFound { page, key } => {
                write!(f, "no selector registered for {}.{}", page, key)
            }
            AutomationError::ElementNotFound { selector } => {
                write!(f, "no element matched selector '{}'", selector)
            }
            AutomationError::StepFailed { step, source } => {
                write!(f, "step '{}' failed: {}", step, source)
            }
            AutomationError::StepTimeout { step, waited_ms } => {
                write!(f, "step '{}' timed out after {}ms", step, waited_ms)
            }
            AutomationError::Cancelled => write!(f, "cancelled by shutdown"),
        }
    }
}

impl std::error::Error for AutomationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AutomationError::LaunchFailed { source }
            | AutomationError::NavigationFailed { source, .. }
            | AutomationError::StepFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// Report sink errors.
#[derive(Debug)]
pub enum ReportError {
    /// Writing a report or artifact file failed
    WriteFailed {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Routing the source file to its destination folder failed
    MoveFailed {
        from: PathBuf,
        to: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::WriteFailed { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
            ReportError::MoveFailed { from, to, source } => {
                write!(
                    f,
                    "failed to move {} to {}: {}",
                    from.display(),
                    to.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReportError::WriteFailed { source, .. } | ReportError::MoveFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

// ========== conversions from common error types ==========

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<WatchError> for AppError {
    fn from(err: WatchError) -> Self {
        AppError::Watch(err)
    }
}

impl From<AutomationError> for AppError {
    fn from(err: AutomationError) -> Self {
        AppError::Automation(err)
    }
}

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        AppError::Report(err)
    }
}

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Automation(AutomationError::StepFailed {
            step: "cdp",
            source: Box::new(err),
        })
    }
}

impl From<notify::Error> for AppError {
    fn from(err: notify::Error) -> Self {
        AppError::Watch(WatchError::BackendFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(format!("json error: {}", err))
    }
}

// ========== convenience constructors ==========

impl AppError {
    pub fn step_failed(
        step: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Automation(AutomationError::StepFailed {
            step,
            source: Box::new(source),
        })
    }

    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Automation(AutomationError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    pub fn file_io(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Watch(WatchError::FileIo {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// True when the failure came out of the automation layer and the
    /// attempt may be retried with a fresh session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Automation(
                AutomationError::LaunchFailed { .. }
                    | AutomationError::NavigationFailed { .. }
                    | AutomationError::ElementNotFound { .. }
                    | AutomationError::StepFailed { .. }
                    | AutomationError::StepTimeout { .. }
            )
        )
    }
}

// ========== Result type alias ==========

/// Application result type
pub type Result<T> = std::result::Result<T, AppError>;
