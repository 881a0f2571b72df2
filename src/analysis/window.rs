//! Snapshot window selection.
//!
//! Reconciliation needs the last N daily forecast snapshots, newest first,
//! with no gaps papered over: a store that has not yet accumulated N days is
//! an error, never a short window.
//!
//! # Skipping the latest issuance
//! When the newest snapshot was issued on the evaluation day itself it cannot
//! contain a forecast for that day (the issuance day is always dropped by the
//! parser). `skip_latest` drops it and extends the window one day further
//! back so the caller still gets exactly `size` snapshots.

use crate::model::WindowError;
use crate::store::{DailySnapshot, SnapshotStore};

/// Reads the `size` most recent snapshots from `store`, newest first.
///
/// # Errors
/// `InsufficientHistory` if the store holds fewer than `size` keys (or
/// `size + 1` with `skip_latest`); `Store` if a snapshot cannot be read.
pub fn select_window<S: SnapshotStore + ?Sized>(
    store: &S,
    size: usize,
    skip_latest: bool,
) -> Result<Vec<DailySnapshot>, WindowError> {
    let keys = select_window_keys(store.list_keys()?, size, skip_latest)?;

    keys.iter()
        .map(|key| store.read_snapshot(key).map_err(WindowError::from))
        .collect()
}

/// Key selection behind `select_window`, without reading documents.
pub fn select_window_keys(
    mut keys: Vec<String>,
    size: usize,
    skip_latest: bool,
) -> Result<Vec<String>, WindowError> {
    // Date keys sort lexicographically in calendar order.
    keys.sort_unstable_by(|a, b| b.cmp(a));
    keys.dedup();

    let skip = usize::from(skip_latest);
    let required = size + skip;
    if keys.len() < required {
        return Err(WindowError::InsufficientHistory {
            required,
            available: keys.len(),
        });
    }

    Ok(keys.into_iter().skip(skip).take(size).collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySnapshotStore;

    /// Store with forecast snapshots for March 1st onwards, inserted out of order.
    fn store_with_days(n: u32) -> MemorySnapshotStore {
        let store = MemorySnapshotStore::new();
        for day in (1..=n).rev() {
            let key = format!("2023-03-{:02}", day);
            store
                .write(&key, &format!(r#"{{"day": "{}"}}"#, key))
                .unwrap();
        }
        store
    }

    fn keys(window: &[DailySnapshot]) -> Vec<&str> {
        window.iter().map(|s| s.key.as_str()).collect()
    }

    #[test]
    fn test_exactly_size_keys_returns_all_newest_first() {
        let window = select_window(&store_with_days(7), 7, false).unwrap();
        assert_eq!(
            keys(&window),
            vec![
                "2023-03-07", "2023-03-06", "2023-03-05", "2023-03-04", "2023-03-03",
                "2023-03-02", "2023-03-01",
            ]
        );
    }

    #[test]
    fn test_one_short_is_insufficient_history() {
        let err = select_window(&store_with_days(6), 7, false).unwrap_err();
        assert!(matches!(
            err,
            WindowError::InsufficientHistory { required: 7, available: 6 }
        ));
    }

    #[test]
    fn test_larger_store_returns_only_newest() {
        let window = select_window(&store_with_days(10), 7, false).unwrap();
        assert_eq!(window.len(), 7);
        assert_eq!(window[0].key, "2023-03-10");
        assert_eq!(window[6].key, "2023-03-04");
    }

    #[test]
    fn test_skip_latest_shifts_window_back_one_day() {
        let window = select_window(&store_with_days(8), 7, true).unwrap();
        assert_eq!(window.len(), 7);
        // Newest in the window is the store's second newest.
        assert_eq!(window[0].key, "2023-03-07");
        // The eighth newest is pulled in.
        assert_eq!(window[6].key, "2023-03-01");
    }

    #[test]
    fn test_skip_latest_needs_one_extra_day() {
        let err = select_window(&store_with_days(7), 7, true).unwrap_err();
        assert!(matches!(
            err,
            WindowError::InsufficientHistory { required: 8, available: 7 }
        ));
    }

    #[test]
    fn test_window_does_not_mutate_store() {
        let store = store_with_days(9);
        select_window(&store, 7, true).unwrap();
        assert_eq!(store.len(), 9);
    }

    #[test]
    fn test_unreadable_snapshot_is_store_error() {
        let store = store_with_days(2);
        store.write("2023-03-03", "not json").unwrap();
        let err = select_window(&store, 2, false).unwrap_err();
        assert!(matches!(err, WindowError::Store(_)));
    }

    #[test]
    fn test_key_selection_dedups() {
        let keys = vec![
            "2023-03-02".to_string(),
            "2023-03-01".to_string(),
            "2023-03-02".to_string(),
        ];
        let err = select_window_keys(keys, 3, false).unwrap_err();
        assert!(matches!(err, WindowError::InsufficientHistory { available: 2, .. }));
    }
}
