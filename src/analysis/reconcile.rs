//! Forecast–observation reconciliation.
//!
//! Given a window of forecast snapshots (newest issuance first) and the
//! observation snapshot for one day, find every forecast that targeted that
//! day and record how far off it was.
//!
//! The function is pure: the target date comes from the observation
//! snapshot, never from the clock, and identical inputs always produce an
//! identical output.

use crate::cities::CityProfile;
use crate::logging::Component;
use crate::model::{
    CityReconciliation, MetricKind, ReconcileError, ReconciledOutput, ReconciledRecord,
    calendar_day, signed_diff,
};
use crate::store::{CityEntry, DailySnapshot};

/// Reconciles `window` against `observations` for every city in `cities`.
///
/// Matching is exact on the calendar day: a period starting
/// `2023-03-21T00:00:00+11:00` matches the target `2023-03-21` only.
///
/// A city without any matching forecast gets an empty record list. A city
/// absent from `observations` is left out of the output.
///
/// # Errors
/// `MalformedSnapshot` if a city's entry has the wrong shape (a forecast list
/// in the observation snapshot, or a single value in a forecast snapshot).
pub fn reconcile(
    cities: &[CityProfile],
    window: &[DailySnapshot],
    observations: &DailySnapshot,
    metric: MetricKind,
) -> Result<ReconciledOutput, ReconcileError> {
    let target = calendar_day(&observations.day);
    let mut results = Vec::with_capacity(cities.len());

    for city in cities {
        let code = city.code.as_str();
        let observed = match observations.entry(code) {
            Some(CityEntry::Observation(value)) => *value,
            Some(other) => {
                return Err(malformed(observations, code, "an observation value", other));
            }
            None => {
                tracing::warn!(
                    component = %Component::Recon,
                    city = code,
                    "No {} observation for {}, city omitted",
                    metric,
                    target
                );
                continue;
            }
        };

        let mut records = Vec::new();
        for snapshot in window {
            let periods = match snapshot.entry(code) {
                Some(CityEntry::Forecasts(periods)) => periods,
                Some(other) => return Err(malformed(snapshot, code, "a forecast list", other)),
                None => continue,
            };

            let issuance = calendar_day(&snapshot.day);
            for period in periods.iter().filter(|p| p.target_day() == target) {
                let forecast = period.value(metric);
                records.push(ReconciledRecord {
                    city: code.to_string(),
                    target_date: target.to_string(),
                    observed,
                    issuance_date: issuance.to_string(),
                    forecast,
                    diff: signed_diff(observed, forecast),
                });
            }
        }

        if records.is_empty() {
            tracing::debug!(
                component = %Component::Recon,
                city = code,
                "No forecasts in window targeted {}",
                target
            );
        }

        results.push(CityReconciliation {
            city: code.to_string(),
            observed,
            records,
        });
    }

    Ok(ReconciledOutput {
        day: target.to_string(),
        metric,
        cities: results,
    })
}

fn malformed(
    snapshot: &DailySnapshot,
    city: &str,
    expected: &'static str,
    found: &CityEntry,
) -> ReconcileError {
    ReconcileError::MalformedSnapshot {
        key: snapshot.key.clone(),
        city: city.to_string(),
        expected,
        found: found.describe(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
