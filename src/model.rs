//! Core data types for the forecast reconciliation service.
//!
//! This module defines the shared domain model imported by all other modules:
//! metric kinds, observations, forecast periods, reconciled records, and the
//! error enums raised at each stage. It contains no I/O.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Metric kinds
// ---------------------------------------------------------------------------

/// Which daily temperature extreme a reading or forecast refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Min,
    Max,
}

impl MetricKind {
    /// Element `type` attribute carrying this metric in an observation bulletin.
    pub fn observation_element(self) -> &'static str {
        match self {
            MetricKind::Min => "minimum_air_temperature",
            MetricKind::Max => "maximum_air_temperature",
        }
    }

    /// Element `type` attribute carrying this metric in a forecast period.
    pub fn forecast_element(self) -> &'static str {
        match self {
            MetricKind::Min => "air_temperature_minimum",
            MetricKind::Max => "air_temperature_maximum",
        }
    }

    /// Calendar day an observation of this kind, read on `today`, belongs to.
    ///
    /// The overnight minimum published in the morning bulletin is attributed
    /// to the previous day; the maximum belongs to the current day.
    pub fn observation_day(self, today: NaiveDate) -> NaiveDate {
        match self {
            MetricKind::Min => today - Duration::days(1),
            MetricKind::Max => today,
        }
    }

    /// Name of the snapshot family holding observations of this kind.
    pub fn observation_family(self) -> &'static str {
        match self {
            MetricKind::Min => "min_obs",
            MetricKind::Max => "max_obs",
        }
    }

    /// Name of the family holding reconciled outputs for this kind.
    pub fn reconciled_family(self) -> &'static str {
        match self {
            MetricKind::Min => "reconciled_min",
            MetricKind::Max => "reconciled_max",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Min => write!(f, "min"),
            MetricKind::Max => write!(f, "max"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" => Ok(MetricKind::Min),
            "max" => Ok(MetricKind::Max),
            other => Err(format!("metric must be either 'min' or 'max', not '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Reading types
// ---------------------------------------------------------------------------

/// One observed daily extreme for a city.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub city: String,
    pub date: NaiveDate,
    pub kind: MetricKind,
    pub value: f64,
}

/// One future day from a forecast bulletin.
///
/// Serialized as `{"day": ..., "max": ..., "min": ...}` inside a forecast
/// snapshot. The city code and the issuance date come from the snapshot that
/// holds the period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPeriod {
    /// Local start time with UTC offset, e.g. "2023-03-21T00:00:00+11:00".
    #[serde(rename = "day")]
    pub start_time_local: String,
    pub max: f64,
    pub min: f64,
}

impl ForecastPeriod {
    /// Calendar-day portion of the start time, clock and offset ignored.
    pub fn target_day(&self) -> &str {
        calendar_day(&self.start_time_local)
    }

    /// Target date as a `NaiveDate`, if the start time is well formed.
    pub fn target_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.target_day(), "%Y-%m-%d").ok()
    }

    /// Forecast value for the requested metric.
    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Min => self.min,
            MetricKind::Max => self.max,
        }
    }
}

/// Returns the `YYYY-MM-DD` prefix of an ISO-8601 date or date-time string,
/// whatever separates the date from the clock.
pub fn calendar_day(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}

// ---------------------------------------------------------------------------
// Reconciled output
// ---------------------------------------------------------------------------

/// One forecast compared with what was observed on its target date.
///
/// Only the issuance day, forecast and diff are serialized; the remaining
/// fields are implied by the enclosing city entry and output document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledRecord {
    #[serde(skip)]
    pub city: String,
    #[serde(skip)]
    pub target_date: String,
    #[serde(skip)]
    pub observed: f64,
    #[serde(rename = "day")]
    pub issuance_date: String,
    pub forecast: f64,
    /// observed − forecast, rounded to two decimal places.
    pub diff: f64,
}

/// All reconciled records for one city, newest issuance first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityReconciliation {
    #[serde(skip)]
    pub city: String,
    #[serde(rename = "obs")]
    pub observed: f64,
    #[serde(rename = "forecasts")]
    pub records: Vec<ReconciledRecord>,
}

/// Result of reconciling one target date for all configured cities.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledOutput {
    pub day: String,
    pub metric: MetricKind,
    /// Cities in registry order.
    pub cities: Vec<CityReconciliation>,
}

impl ReconciledOutput {
    pub fn city(&self, code: &str) -> Option<&CityReconciliation> {
        self.cities.iter().find(|c| c.city == code)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for ReconciledOutput {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.cities.len() + 1))?;
        map.serialize_entry("day", &self.day)?;
        for city in &self.cities {
            map.serialize_entry(&city.city, city)?;
        }
        map.end()
    }
}

/// observed − forecast, rounded half away from zero to two decimal places.
pub fn signed_diff(observed: f64, forecast: f64) -> f64 {
    round_hundredths(observed - forecast)
}

fn round_hundredths(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    // Avoid serializing "-0.0" for exact forecasts.
    if rounded == 0.0 { 0.0 } else { rounded }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while turning a bulletin document into records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BulletinError {
    /// The station, area, or metric element is not in the document.
    #[error("Element not found: {0}")]
    ElementNotFound(String),
    /// A retained forecast period lacks its maximum or minimum element.
    #[error("Incomplete forecast period #{index} ({start}): missing {missing}")]
    IncompletePeriod {
        index: usize,
        start: String,
        missing: &'static str,
    },
    /// Element text could not be read as a plausible temperature or date.
    #[error("Malformed value for {context}: '{value}'")]
    MalformedValue { context: String, value: String },
    /// The markup itself could not be read.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
}

/// Errors from the remote bulletin source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// Non-2xx response for the product file.
    #[error("HTTP error {status} fetching {source_id}")]
    Http { source_id: String, status: u16 },
    /// Connection, timeout, or body read failure.
    #[error("Request for {source_id} failed: {message}")]
    Transport { source_id: String, message: String },
}

/// Errors from a snapshot store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Snapshot not found: {0}")]
    NotFound(String),
    /// Snapshots are immutable once written.
    #[error("Snapshot already exists: {0}")]
    AlreadyExists(String),
    /// Keys must be calendar dates (`YYYY-MM-DD`) so that they sort by date.
    #[error("Invalid snapshot key: '{0}'")]
    InvalidKey(String),
    #[error("Snapshot {key} is not a valid document: {message}")]
    InvalidDocument { key: String, message: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] postgres::Error),
}

/// Errors from the snapshot window selector.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("Insufficient history: window needs {required} snapshots, store has {available}")]
    InsufficientHistory { required: usize, available: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the reconciliation engine. Missing forecasts are never errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    #[error("Snapshot {key}: entry for {city} is {found}, expected {expected}")]
    MalformedSnapshot {
        key: String,
        city: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors from loading or querying the city configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not find city {0}")]
    InvalidCity(String),
    #[error("Duplicate city code {0} in configuration")]
    DuplicateCity(String),
    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Could not parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

/// Why a single city's data was omitted from a snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CityFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{error} (after {attempts} attempt(s))")]
    Parse { error: BulletinError, attempts: u32 },
    #[error("Run cancelled before city was processed")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn period(day: &str, max: f64, min: f64) -> ForecastPeriod {
        ForecastPeriod {
            start_time_local: day.to_string(),
            max,
            min,
        }
    }

    #[test]
    fn test_diff_is_observed_minus_forecast() {
        assert_eq!(signed_diff(20.0, 21.0), -1.0);
        assert_eq!(signed_diff(20.0, 19.5), 0.5);
    }

    #[test]
    fn test_diff_rounds_to_two_decimal_places() {
        assert_eq!(signed_diff(20.3, 18.1), 2.2);
        // Ties round away from zero.
        assert_eq!(signed_diff(0.125, 0.0), 0.13);
        assert_eq!(signed_diff(-0.125, 0.0), -0.13);
    }

    #[test]
    fn test_exact_forecast_has_positive_zero_diff() {
        let diff = signed_diff(21.0, 21.0);
        assert_eq!(diff, 0.0);
        assert!(diff.is_sign_positive());
    }

    #[test]
    fn test_target_day_strips_clock_and_offset() {
        let p = period("2023-03-21T00:00:00+11:00", 21.0, 14.0);
        assert_eq!(p.target_day(), "2023-03-21");
        assert_eq!(p.target_date(), NaiveDate::from_ymd_opt(2023, 3, 21));
    }

    #[test]
    fn test_target_day_with_space_separator() {
        let p = period("2023-03-21 00:00:00+11:00", 21.0, 14.0);
        assert_eq!(p.target_day(), "2023-03-21");
        assert_eq!(calendar_day("2023-03-21"), "2023-03-21");
        assert_eq!(calendar_day("2023-03"), "2023-03");
    }

    #[test]
    fn test_forecast_value_selects_metric() {
        let p = period("2023-03-21T00:00:00+11:00", 21.0, 14.0);
        assert_eq!(p.value(MetricKind::Max), 21.0);
        assert_eq!(p.value(MetricKind::Min), 14.0);
    }

    #[test]
    fn test_min_observation_belongs_to_previous_day() {
        let today = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        assert_eq!(
            MetricKind::Min.observation_day(today),
            NaiveDate::from_ymd_opt(2023, 2, 28).unwrap()
        );
        assert_eq!(MetricKind::Max.observation_day(today), today);
    }

    #[test]
    fn test_metric_kind_parses_case_insensitively() {
        assert_eq!("MAX".parse::<MetricKind>(), Ok(MetricKind::Max));
        assert_eq!(" min ".parse::<MetricKind>(), Ok(MetricKind::Min));
        assert!("mean".parse::<MetricKind>().is_err());
    }

    #[test]
    fn test_forecast_period_serializes_with_day_key() {
        let p = period("2023-03-21T00:00:00+11:00", 21.0, 14.0);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["day"], "2023-03-21T00:00:00+11:00");
        assert_eq!(json["max"], 21.0);
        assert_eq!(json["min"], 14.0);
    }

    #[test]
    fn test_reconciled_output_layout() {
        let output = ReconciledOutput {
            day: "2023-03-21".to_string(),
            metric: MetricKind::Max,
            cities: vec![CityReconciliation {
                city: "MEL".to_string(),
                observed: 20.0,
                records: vec![ReconciledRecord {
                    city: "MEL".to_string(),
                    target_date: "2023-03-21".to_string(),
                    observed: 20.0,
                    issuance_date: "2023-03-20".to_string(),
                    forecast: 21.0,
                    diff: -1.0,
                }],
            }],
        };

        let json: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();
        assert_eq!(json["day"], "2023-03-21");
        assert_eq!(json["MEL"]["obs"], 20.0);
        assert_eq!(json["MEL"]["forecasts"][0]["day"], "2023-03-20");
        assert_eq!(json["MEL"]["forecasts"][0]["forecast"], 21.0);
        assert_eq!(json["MEL"]["forecasts"][0]["diff"], -1.0);
        assert!(json["MEL"]["forecasts"][0].get("observed").is_none());
    }
}
