//! Structured logging for the reconciliation service
//!
//! Events go through `tracing`; this module owns subscriber setup and the
//! conventions shared by every caller: a `component` field naming the part
//! of the pipeline that logged, an optional `city` field, and a
//! classification of per-city failures so that expected gaps do not drown out
//! genuine breakage.

use std::fmt;
use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::model::{BulletinError, CityFailure, FetchError};

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Bom,
    Cache,
    Store,
    Recon,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Bom => write!(f, "BOM"),
            Component::Cache => write!(f, "CACHE"),
            Component::Store => write!(f, "STORE"),
            Component::Recon => write!(f, "RECON"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the run was stopped on purpose
    Expected,
    /// Unexpected failure - configuration points at something that does not exist,
    /// or the bulletin format changed
    Unexpected,
    /// Unknown - upstream outage or a bulletin caught mid-publish
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `min_level` when set. With `log_file`,
/// output is appended to that file without ANSI colours instead of going to
/// stderr.
pub fn init_logger(
    min_level: LogLevel,
    log_file: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(min_level.as_filter()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    }
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify why a city was dropped from a snapshot.
pub fn classify_city_failure(failure: &CityFailure) -> FailureType {
    match failure {
        CityFailure::Cancelled => FailureType::Expected,
        // A 4xx means the configured product id is wrong
        CityFailure::Fetch(FetchError::Http { status, .. }) if *status < 500 && *status != 429 => {
            FailureType::Unexpected
        }
        CityFailure::Fetch(_) => FailureType::Unknown,
        // Missing elements are what a truncated bulletin looks like
        CityFailure::Parse {
            error: BulletinError::ElementNotFound(_),
            ..
        } => FailureType::Unknown,
        CityFailure::Parse { .. } => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a city failure at a level matching its classification.
pub fn log_city_failure(city: &str, operation: &str, failure: &CityFailure) {
    let failure_type = classify_city_failure(failure);

    match failure_type {
        FailureType::Expected => tracing::debug!(
            component = %Component::Bom,
            city,
            "{} failed [{}]: {}",
            operation,
            failure_type,
            failure
        ),
        FailureType::Unexpected => tracing::error!(
            component = %Component::Bom,
            city,
            "{} failed [{}]: {}",
            operation,
            failure_type,
            failure
        ),
        FailureType::Unknown => tracing::warn!(
            component = %Component::Bom,
            city,
            "{} failed [{}]: {}",
            operation,
            failure_type,
            failure
        ),
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log the outcome of a per-city collection run.
pub fn log_collect_summary(operation: &str, total: usize, successful: usize, failed: usize) {
    let message = format!(
        "{} complete: {}/{} cities collected, {} failed",
        operation, successful, total, failed
    );

    if failed == 0 {
        tracing::info!(component = %Component::System, "{}", message);
    } else if successful == 0 {
        tracing::error!(component = %Component::System, "{}", message);
    } else {
        tracing::warn!(component = %Component::System, "{}", message);
    }
}
