//! Forecast/observation reconciliation for Bureau of Meteorology bulletins.
//!
//! Each day the service snapshots the Bureau's city forecasts and the
//! observed temperature extremes, then pairs every forecast with the
//! observation for the day it predicted:
//!
//! ```text
//! ingest (fetch + parse) -> store (daily snapshots) -> analysis (window + reconcile)
//! ```

pub mod analysis;
pub mod cities;
pub mod collect;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod store;
pub mod verify;
