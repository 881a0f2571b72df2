//! Tests against the live Bureau server and a real PostgreSQL database
//!
//! Prerequisites:
//! - Internet access to reg.bom.gov.au
//! - DATABASE_URL set in .env for the PostgreSQL tests (a scratch database;
//!   test rows are written under the `test_` families and removed afterwards)
//!
//! Run with: cargo test --test live_sources -- --ignored --test-threads=1

use std::env;
use std::time::Duration;

use postgres::{Client, NoTls};

use bomright_service::cities::CityRegistry;
use bomright_service::ingest::source::{DEFAULT_BASE_URL, HttpBulletinSource};
use bomright_service::ingest::{BulletinSource, FetchCache};
use bomright_service::model::{FetchError, StoreError};
use bomright_service::store::{PgSnapshotStore, SnapshotStore};
use bomright_service::verify::{self, VerificationStatus};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn live_source() -> HttpBulletinSource {
    HttpBulletinSource::new(DEFAULT_BASE_URL, Duration::from_secs(30), 2, Duration::from_millis(500))
        .expect("Failed to build HTTP client")
}

fn database_url() -> String {
    dotenv::dotenv().ok();
    env::var("DATABASE_URL").expect("DATABASE_URL must be set")
}

fn cleanup_test_families(url: &str) {
    let mut client = Client::connect(url, NoTls).expect("Failed to connect to test database");
    let _ = client.execute("DELETE FROM bomright_snapshots WHERE family LIKE 'test_%'", &[]);
}

// ---------------------------------------------------------------------------
// Bureau server
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires network access
fn test_live_melbourne_bulletins_parse() {
    let source = live_source();
    let cache = FetchCache::new(&source);
    let registry = CityRegistry::builtin();

    let result = verify::verify_city(&cache, registry.find("MEL").unwrap());

    println!("MEL: {:?} {:?}", result.status, result.errors);
    assert_ne!(result.status, VerificationStatus::Failed);
    assert!(result.forecast_periods > 0, "Melbourne precis should have future periods");
}

#[test]
#[ignore] // Requires network access
fn test_live_unknown_product_is_http_error() {
    let err = live_source().fetch("IDX99999.xml").unwrap_err();
    assert!(matches!(err, FetchError::Http { status, .. } if (400..500).contains(&status)));
}

#[test]
#[ignore] // Requires network access
fn test_live_full_verification() {
    let source = live_source();
    let cache = FetchCache::new(&source);
    let registry = CityRegistry::builtin();

    let report = verify::run_verification(&cache, registry.cities(), 4);
    verify::print_summary(&report);

    assert_eq!(report.summary.total, registry.len());
    assert!(report.summary.working + report.summary.partial > 0);
    // Shared files (SYD/CAN) are downloaded once when nothing fails.
    if report.summary.failed == 0 {
        let distinct = registry.observation_sources().len() + registry.forecast_sources().len();
        assert_eq!(cache.retrievals(), distinct);
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL store
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires PostgreSQL
fn test_pg_store_write_once_and_list() {
    let url = database_url();
    let client = PgSnapshotStore::connect(&url).unwrap();
    let store = PgSnapshotStore::new(client.clone(), "test_forecasts").unwrap();
    let other = PgSnapshotStore::new(client, "test_max_obs").unwrap();
    cleanup_test_families(&url);

    store.write("2023-03-20", r#"{"day": "2023-03-20"}"#).unwrap();
    store.write("2023-03-21", r#"{"day": "2023-03-21"}"#).unwrap();

    let mut keys = store.list_keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["2023-03-20".to_string(), "2023-03-21".to_string()]);
    assert!(other.list_keys().unwrap().is_empty(), "families must not leak");

    let err = store.write("2023-03-21", "{}").unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
    assert_eq!(store.read_snapshot("2023-03-21").unwrap().day, "2023-03-21");
    assert!(store.written_at("2023-03-21").unwrap().is_some());
    assert!(matches!(store.read("2023-01-01"), Err(StoreError::NotFound(_))));

    cleanup_test_families(&url);
}
