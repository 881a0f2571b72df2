//! City registry for the forecast reconciliation service.
//!
//! Defines the canonical list of cities whose bulletins are collected, along
//! with the BOM product files and the station/area names used to find each
//! city inside them. This is the single source of truth for city codes: all
//! other modules should take profiles from a `CityRegistry` rather than
//! hardcoding product ids.
//!
//! Several cities share a product file (Sydney and Canberra are both served
//! by the NSW files), which is why fetching goes through `FetchCache`.

use crate::model::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// City metadata
// ---------------------------------------------------------------------------

/// Everything needed to locate one city's data in the published bulletins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CityProfile {
    /// Short unique code, e.g. "MEL".
    pub code: String,
    /// `stn-name` of the observing station in the observation bulletin.
    pub station: String,
    /// Observation product file, e.g. "IDV60920.xml".
    pub observation_source: String,
    /// Forecast product file, e.g. "IDV10753.xml".
    pub forecast_source: String,
    /// `description` of the forecast area in the forecast bulletin.
    pub forecast_area: String,
}

struct BuiltinCity {
    code: &'static str,
    station: &'static str,
    observation_source: &'static str,
    forecast_source: &'static str,
    forecast_area: &'static str,
}

impl From<&BuiltinCity> for CityProfile {
    fn from(c: &BuiltinCity) -> Self {
        CityProfile {
            code: c.code.to_string(),
            station: c.station.to_string(),
            observation_source: c.observation_source.to_string(),
            forecast_source: c.forecast_source.to_string(),
            forecast_area: c.forecast_area.to_string(),
        }
    }
}

/// The capital cities tracked by default, in reporting order.
///
/// Sources: BOM anonymous product directory (`/anon/gen/fwo/`).
///   - IDx60920: state observation summaries
///   - IDV10753, IDS10044, IDN11060, ...: city/district precis forecasts
static BUILTIN_CITIES: &[BuiltinCity] = &[
    BuiltinCity {
        code: "MEL",
        station: "MELBOURNE (OLYMPIC PARK)",
        observation_source: "IDV60920.xml",
        forecast_source: "IDV10753.xml",
        forecast_area: "Melbourne",
    },
    BuiltinCity {
        code: "ADL",
        station: "ADELAIDE (WEST TERRACE / NGAYIRDAPIRA)",
        observation_source: "IDS60920.xml",
        forecast_source: "IDS10044.xml",
        forecast_area: "Adelaide",
    },
    BuiltinCity {
        code: "SYD",
        station: "SYDNEY (OBSERVATORY HILL)",
        observation_source: "IDN60920.xml",
        forecast_source: "IDN11060.xml",
        forecast_area: "Sydney",
    },
    BuiltinCity {
        code: "BNE",
        station: "BRISBANE",
        observation_source: "IDQ60920.xml",
        forecast_source: "IDQ11295.xml",
        forecast_area: "Brisbane",
    },
    BuiltinCity {
        code: "PER",
        station: "PERTH METRO",
        observation_source: "IDW60920.xml",
        forecast_source: "IDW14199.xml",
        forecast_area: "Perth",
    },
    BuiltinCity {
        code: "CAN",
        station: "CANBERRA AIRPORT",
        observation_source: "IDN60920.xml",
        forecast_source: "IDN11060.xml",
        forecast_area: "Canberra",
    },
    BuiltinCity {
        code: "HOB",
        station: "HOBART (ELLERSLIE ROAD)",
        observation_source: "IDT60920.xml",
        forecast_source: "IDT16710.xml",
        forecast_area: "Hobart",
    },
    BuiltinCity {
        code: "DAR",
        station: "DARWIN AIRPORT",
        observation_source: "IDD60920.xml",
        forecast_source: "IDD10207.xml",
        forecast_area: "Darwin",
    },
];

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// An ordered, validated set of city profiles. Read-only once built.
#[derive(Debug, Clone)]
pub struct CityRegistry {
    cities: Vec<CityProfile>,
}

#[derive(Debug, Deserialize)]
struct CitiesFile {
    city: Vec<CityProfile>,
}

impl CityRegistry {
    /// Builds a registry, rejecting duplicate city codes.
    pub fn new(cities: Vec<CityProfile>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for city in &cities {
            if !seen.insert(city.code.as_str()) {
                return Err(ConfigError::DuplicateCity(city.code.clone()));
            }
        }
        Ok(CityRegistry { cities })
    }

    /// The built-in capital city set.
    pub fn builtin() -> Self {
        CityRegistry {
            cities: BUILTIN_CITIES.iter().map(CityProfile::from).collect(),
        }
    }

    /// Parses `[[city]]` tables from TOML text.
    pub fn from_toml_str(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let file: CitiesFile = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        Self::new(file.city)
    }

    /// Loads a city set from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text, &path.display().to_string())
    }

    pub fn cities(&self) -> &[CityProfile] {
        &self.cities
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    /// Looks up a city by code.
    pub fn find(&self, code: &str) -> Result<&CityProfile, ConfigError> {
        self.cities
            .iter()
            .find(|c| c.code == code)
            .ok_or_else(|| ConfigError::InvalidCity(code.to_string()))
    }

    /// City codes in registry order.
    pub fn codes(&self) -> Vec<&str> {
        self.cities.iter().map(|c| c.code.as_str()).collect()
    }

    /// Distinct observation product files, first-seen order.
    pub fn observation_sources(&self) -> Vec<&str> {
        distinct(self.cities.iter().map(|c| c.observation_source.as_str()))
    }

    /// Distinct forecast product files, first-seen order.
    pub fn forecast_sources(&self) -> Vec<&str> {
        distinct(self.cities.iter().map(|c| c.forecast_source.as_str()))
    }
}

fn distinct<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
