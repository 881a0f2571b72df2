//! Snapshot collection
//!
//! Builds the daily observation and forecast snapshots for every configured
//! city: fetch the city's bulletin through the run's `FetchCache`, parse it,
//! and gather the results into one `DailySnapshot`.
//!
//! A city that cannot be collected is left out of the snapshot and reported
//! in `CollectReport::failures`; it never aborts the run. Parse failures are
//! retried with a fresh copy of the bulletin, since the Bureau's files are
//! occasionally caught mid-publish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDate;

use crate::cities::CityProfile;
use crate::ingest::bom::{parse_forecast_periods, parse_observation};
use crate::ingest::fetch_cache::FetchCache;
use crate::ingest::source::BulletinSource;
use crate::logging::{self, Component};
use crate::model::{BulletinError, CityFailure, ForecastPeriod, MetricKind};
use crate::store::DailySnapshot;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Total fetch+parse tries per city.
    pub parse_attempts: u32,
    /// Pause before re-fetching after a parse failure.
    pub retry_delay: Duration,
    /// Parallel retrievals during prefetch.
    pub workers: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        CollectOptions {
            parse_attempts: 3,
            retry_delay: Duration::from_secs(2),
            workers: 4,
        }
    }
}

/// Outcome of one collection run.
#[derive(Debug)]
pub struct CollectReport {
    pub snapshot: DailySnapshot,
    /// Cities left out of `snapshot`, in registry order.
    pub failures: Vec<(String, CityFailure)>,
}

impl CollectReport {
    pub fn collected(&self) -> usize {
        self.snapshot.cities.len()
    }
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

pub struct Collector<'r, 's, S: BulletinSource + ?Sized> {
    cache: &'r FetchCache<'s, S>,
    cities: &'r [CityProfile],
    options: CollectOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'r, 's, S: BulletinSource + ?Sized> Collector<'r, 's, S> {
    pub fn new(cache: &'r FetchCache<'s, S>, cities: &'r [CityProfile], options: CollectOptions) -> Self {
        Collector {
            cache,
            cities,
            options,
            cancel: None,
        }
    }

    /// Stops the run before the next city once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Collects today's observations of `kind`.
    ///
    /// The snapshot is keyed by the day the readings belong to, which for the
    /// overnight minimum is the day before `today`.
    pub fn collect_observations(&self, kind: MetricKind, today: NaiveDate) -> CollectReport {
        let day = kind.observation_day(today);
        let operation = format!("{} observations for {}", kind, day);

        if !self.cancelled() {
            self.cache.prefetch(
                self.cities.iter().map(|c| c.observation_source.as_str()),
                self.options.workers,
            );
        }

        let mut observations = Vec::new();
        let mut failures = Vec::new();

        for city in self.cities {
            let result = self.city_step(&city.observation_source, |document| {
                parse_observation(document, city, kind, day)
            });

            match result {
                Ok(observation) => {
                    tracing::debug!(
                        component = %Component::Bom,
                        city = %observation.city,
                        value = observation.value,
                        "Observed {} for {}",
                        observation.kind,
                        observation.date
                    );
                    observations.push(observation);
                }
                Err(failure) => {
                    logging::log_city_failure(&city.code, &operation, &failure);
                    failures.push((city.code.clone(), failure));
                }
            }
        }

        logging::log_collect_summary(&operation, self.cities.len(), observations.len(), failures.len());

        CollectReport {
            snapshot: DailySnapshot::from_observations(day, &observations),
            failures,
        }
    }

    /// Collects the forecasts issued on `issuance`.
    ///
    /// Only periods targeting a day after the issuance day are kept.
    pub fn collect_forecasts(&self, issuance: NaiveDate) -> CollectReport {
        let operation = format!("forecasts issued {}", issuance);

        if !self.cancelled() {
            self.cache.prefetch(
                self.cities.iter().map(|c| c.forecast_source.as_str()),
                self.options.workers,
            );
        }

        let mut forecasts: Vec<(String, Vec<ForecastPeriod>)> = Vec::new();
        let mut failures = Vec::new();

        for city in self.cities {
            let result = self.city_step(&city.forecast_source, |document| {
                parse_forecast_periods(document, &city.forecast_area)
            });

            match result {
                Ok(periods) => {
                    let periods: Vec<ForecastPeriod> = periods
                        .into_iter()
                        .filter(|p| p.target_date().is_some_and(|d| d > issuance))
                        .collect();
                    tracing::debug!(
                        component = %Component::Bom,
                        city = %city.code,
                        periods = periods.len(),
                        "Collected forecast"
                    );
                    forecasts.push((city.code.clone(), periods));
                }
                Err(failure) => {
                    logging::log_city_failure(&city.code, &operation, &failure);
                    failures.push((city.code.clone(), failure));
                }
            }
        }

        logging::log_collect_summary(&operation, self.cities.len(), forecasts.len(), failures.len());

        CollectReport {
            snapshot: DailySnapshot::from_forecasts(issuance, forecasts),
            failures,
        }
    }

    /// Fetch and parse one city's bulletin, re-fetching after parse failures.
    fn city_step<T>(
        &self,
        source_id: &str,
        parse: impl Fn(&str) -> Result<T, BulletinError>,
    ) -> Result<T, CityFailure> {
        let attempts = self.options.parse_attempts.max(1);
        let mut attempt = 1;

        loop {
            if self.cancelled() {
                return Err(CityFailure::Cancelled);
            }

            let document = self.cache.fetch(source_id)?;
            match parse(&document) {
                Ok(value) => return Ok(value),
                Err(error) if attempt < attempts => {
                    tracing::warn!(
                        component = %Component::Bom,
                        source_id,
                        attempt,
                        "Parse failed, re-fetching: {}",
                        error
                    );
                    self.cache.invalidate(source_id);
                    std::thread::sleep(self.options.retry_delay);
                    attempt += 1;
                }
                Err(error) => {
                    return Err(CityFailure::Parse {
                        error,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

// ============================================================================
// Tests
// ============================================================================
