//! Daily snapshot documents.
//!
//! A snapshot is one JSON object per day:
//!
//! ```text
//! {"day": "2023-03-21", "MEL": 20.0, "SYD": 24.1}                       observations
//! {"day": "2023-03-20", "MEL": [{"day": "...", "max": 21, "min": 14}]}   forecasts
//! ```
//!
//! Older forecast files used `accessed` instead of `day`; both are read.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::logging::Component;
use crate::model::{ForecastPeriod, Observation, StoreError};

/// Payload for one city: a single observed value or a forecast sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CityEntry {
    Observation(f64),
    Forecasts(Vec<ForecastPeriod>),
}

impl CityEntry {
    pub fn describe(&self) -> &'static str {
        match self {
            CityEntry::Observation(_) => "an observation value",
            CityEntry::Forecasts(_) => "a forecast list",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySnapshot {
    /// Store key, `YYYY-MM-DD`.
    pub key: String,
    /// Observation day or forecast issuance day.
    pub day: String,
    pub cities: BTreeMap<String, CityEntry>,
}

impl DailySnapshot {
    /// Observation snapshot for `day`, keyed by that day.
    ///
    /// Readings that belong to another day are left out.
    pub fn from_observations(day: NaiveDate, observations: &[Observation]) -> Self {
        let mut cities = BTreeMap::new();
        for o in observations {
            if o.date != day {
                tracing::warn!(
                    component = %Component::Store,
                    city = %o.city,
                    "Skipping {} reading for {} in the {} snapshot",
                    o.kind,
                    o.date,
                    day
                );
                continue;
            }
            cities.insert(o.city.clone(), CityEntry::Observation(o.value));
        }

        let day = day.format("%Y-%m-%d").to_string();
        DailySnapshot {
            key: day.clone(),
            day,
            cities,
        }
    }

    /// Forecast snapshot issued on `issuance`, keyed by that day.
    pub fn from_forecasts(
        issuance: NaiveDate,
        forecasts: impl IntoIterator<Item = (String, Vec<ForecastPeriod>)>,
    ) -> Self {
        let day = issuance.format("%Y-%m-%d").to_string();
        DailySnapshot {
            key: day.clone(),
            day,
            cities: forecasts
                .into_iter()
                .map(|(city, periods)| (city, CityEntry::Forecasts(periods)))
                .collect(),
        }
    }

    pub fn entry(&self, city: &str) -> Option<&CityEntry> {
        self.cities.get(city)
    }

    /// Parses a stored document.
    pub fn from_json(key: &str, document: &str) -> Result<Self, StoreError> {
        let invalid = |message: String| StoreError::InvalidDocument {
            key: key.to_string(),
            message,
        };

        let value: serde_json::Value =
            serde_json::from_str(document).map_err(|e| invalid(e.to_string()))?;
        let serde_json::Value::Object(mut object) = value else {
            return Err(invalid("top level is not an object".to_string()));
        };

        // Both keys come out so neither is read as a city.
        let day = object.remove("day");
        let accessed = object.remove("accessed");
        let day = match day.or(accessed) {
            Some(serde_json::Value::String(day)) => day,
            Some(other) => return Err(invalid(format!("'day' is not a string: {}", other))),
            None => return Err(invalid("missing 'day'".to_string())),
        };

        let mut cities = BTreeMap::new();
        for (city, entry) in object {
            let entry: CityEntry = serde_json::from_value(entry)
                .map_err(|e| invalid(format!("entry for {}: {}", city, e)))?;
            cities.insert(city, entry);
        }

        Ok(DailySnapshot {
            key: key.to_string(),
            day,
            cities,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for DailySnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.cities.len() + 1))?;
        map.serialize_entry("day", &self.day)?;
        for (city, entry) in &self.cities {
            map.serialize_entry(city, entry)?;
        }
        map.end()
    }
}

/// True if `key` is a `YYYY-MM-DD` calendar date.
pub fn is_date_key(key: &str) -> bool {
    key.len() == 10 && NaiveDate::parse_from_str(key, "%Y-%m-%d").is_ok()
}
