//! Bulletin Source Verification
//!
//! Checks the city configuration against the live bulletins: is every
//! configured station present in its observation file with readable
//! temperatures, and does every forecast area yield future periods?
//!
//! Run this after editing a cities file or when the Bureau renames a product.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cities::CityProfile;
use crate::ingest::bom::{parse_forecast_periods, parse_observation};
use crate::ingest::fetch_cache::FetchCache;
use crate::ingest::source::BulletinSource;
use crate::model::MetricKind;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub cities: Vec<CityVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub total: usize,
    pub working: usize,
    pub partial: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityVerification {
    pub city: String,
    pub status: VerificationStatus,
    pub observation_source: String,
    pub forecast_source: String,
    /// Metrics readable for the station right now.
    pub observation_metrics: Vec<MetricKind>,
    /// Periods after the issuance day found for the forecast area.
    pub forecast_periods: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Per-city checks
// ============================================================================

/// Checks one city's observation station and forecast area.
///
/// `PartialSuccess` means one side works: typically a station whose overnight
/// minimum has not been published yet, or a moved forecast area.
pub fn verify_city<S: BulletinSource + ?Sized>(
    cache: &FetchCache<'_, S>,
    city: &CityProfile,
) -> CityVerification {
    let mut result = CityVerification {
        city: city.code.clone(),
        status: VerificationStatus::Failed,
        observation_source: city.observation_source.clone(),
        forecast_source: city.forecast_source.clone(),
        observation_metrics: Vec::new(),
        forecast_periods: 0,
        errors: Vec::new(),
    };

    match cache.fetch(&city.observation_source) {
        Ok(document) => {
            let today = Utc::now().date_naive();
            for kind in [MetricKind::Min, MetricKind::Max] {
                match parse_observation(&document, city, kind, kind.observation_day(today)) {
                    Ok(observation) => result.observation_metrics.push(observation.kind),
                    Err(e) => result.errors.push(format!("{} observation: {}", kind, e)),
                }
            }
        }
        Err(e) => result.errors.push(e.to_string()),
    }

    match cache.fetch(&city.forecast_source) {
        Ok(document) => match parse_forecast_periods(&document, &city.forecast_area) {
            Ok(periods) => result.forecast_periods = periods.len(),
            Err(e) => result.errors.push(format!("forecast: {}", e)),
        },
        Err(e) => result.errors.push(e.to_string()),
    }

    let observations_ok = result.observation_metrics.len() == 2;
    let forecasts_ok = result.forecast_periods > 0;
    result.status = match (observations_ok, forecasts_ok) {
        (true, true) => VerificationStatus::Success,
        (false, false) if result.observation_metrics.is_empty() => VerificationStatus::Failed,
        _ => VerificationStatus::PartialSuccess,
    };

    result
}

// ============================================================================
// Full Verification Run
// ============================================================================

/// Verifies every city, fetching each distinct product file once.
pub fn run_verification<S: BulletinSource + ?Sized>(
    cache: &FetchCache<'_, S>,
    cities: &[CityProfile],
    workers: usize,
) -> VerificationReport {
    cache.prefetch(
        cities
            .iter()
            .flat_map(|c| [c.observation_source.as_str(), c.forecast_source.as_str()]),
        workers,
    );

    let mut summary = VerificationSummary {
        total: cities.len(),
        ..VerificationSummary::default()
    };
    let mut results = Vec::with_capacity(cities.len());

    println!("🔍 Verifying bulletin sources...");
    for city in cities {
        print!("  {} ({} / {})... ", city.code, city.station, city.forecast_area);
        let result = verify_city(cache, city);

        match result.status {
            VerificationStatus::Success => {
                summary.working += 1;
                println!("✓ OK ({} forecast periods)", result.forecast_periods);
            }
            VerificationStatus::PartialSuccess => {
                summary.partial += 1;
                println!("⚠ Partial: {}", result.errors.join("; "));
            }
            VerificationStatus::Failed => {
                summary.failed += 1;
                println!("✗ FAILED: {}", result.errors.join("; "));
            }
        }
        results.push(result);
    }

    VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        cities: results,
        summary,
    }
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 VERIFICATION SUMMARY");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!(
        "Cities:   {}/{} working  ({} partial, {} failed)",
        report.summary.working, report.summary.total, report.summary.partial, report.summary.failed
    );

    let success_rate = if report.summary.total > 0 {
        (report.summary.working as f64 / report.summary.total as f64) * 100.0
    } else {
        0.0
    };
    println!("Success Rate: {:.1}%", success_rate);
    println!("═══════════════════════════════════════════════════════════");
}
