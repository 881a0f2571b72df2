//! Service configuration
//!
//! Settings come from an optional TOML file, then environment variables
//! (after loading `.env`) override individual values:
//!
//! ```toml
//! cities_file = "cities.toml"
//!
//! [source]
//! base_url = "http://reg.bom.gov.au/fwo/"
//! timeout_secs = 30
//!
//! [store]
//! data_dir = "data"
//! # database_url = "postgres://..."   # use PostgreSQL instead of files
//!
//! [reconcile]
//! window_size = 7
//! ```
//!
//! | Variable               | Overrides               |
//! |------------------------|-------------------------|
//! | `BOMRIGHT_BASE_URL`    | `source.base_url`       |
//! | `BOMRIGHT_DATA_DIR`    | `store.data_dir`        |
//! | `DATABASE_URL`         | `store.database_url`    |
//! | `BOMRIGHT_WORKERS`     | `collect.workers`       |
//! | `BOMRIGHT_WINDOW_SIZE` | `reconcile.window_size` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, Utc};
use serde::Deserialize;

use crate::cities::CityRegistry;
use crate::collect::CollectOptions;
use crate::ingest::source::DEFAULT_BASE_URL;
use crate::model::ConfigError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub collect: CollectConfig,
    pub store: StoreConfig,
    pub reconcile: ReconcileConfig,
    pub time: TimeConfig,
    /// TOML file of `[[city]]` tables replacing the built-in cities.
    pub cities_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectConfig {
    pub workers: usize,
    pub parse_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for CollectConfig {
    fn default() -> Self {
        CollectConfig {
            workers: 4,
            parse_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from("data"),
            database_url: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    pub window_size: usize,
    pub skip_latest: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            window_size: 7,
            skip_latest: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeConfig {
    /// Offset used to decide what "today" is; +10 is eastern Australia.
    pub utc_offset_hours: i32,
}

impl Default for TimeConfig {
    fn default() -> Self {
        TimeConfig { utc_offset_hours: 10 }
    }
}

impl AppConfig {
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Reads `path` if given (defaults otherwise), then applies the process
    /// environment including `.env`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text, &path.display().to_string())?
            }
            None => AppConfig::default(),
        };

        dotenv::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("BOMRIGHT_BASE_URL") {
            self.source.base_url = url;
        }
        if let Some(dir) = lookup("BOMRIGHT_DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.store.database_url = Some(url);
        }
        if let Some(value) = lookup("BOMRIGHT_WORKERS") {
            self.collect.workers = parse_number("BOMRIGHT_WORKERS", &value)?;
        }
        if let Some(value) = lookup("BOMRIGHT_WINDOW_SIZE") {
            self.reconcile.window_size = parse_number("BOMRIGHT_WINDOW_SIZE", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile.window_size == 0 {
            return Err(invalid("reconcile.window_size", "0"));
        }
        if !(-12..=14).contains(&self.time.utc_offset_hours) {
            return Err(invalid(
                "time.utc_offset_hours",
                &self.time.utc_offset_hours.to_string(),
            ));
        }
        Ok(())
    }

    /// Cities from `cities_file`, or the built-in set.
    pub fn city_registry(&self) -> Result<CityRegistry, ConfigError> {
        match &self.cities_file {
            Some(path) => CityRegistry::load(path),
            None => Ok(CityRegistry::builtin()),
        }
    }

    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            parse_attempts: self.collect.parse_attempts,
            retry_delay: Duration::from_millis(self.collect.retry_delay_ms),
            workers: self.collect.workers,
        }
    }

    /// Current calendar day at the configured offset.
    pub fn today(&self) -> NaiveDate {
        match FixedOffset::east_opt(self.time.utc_offset_hours * 3600) {
            Some(offset) => Utc::now().with_timezone(&offset).date_naive(),
            None => Utc::now().date_naive(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
