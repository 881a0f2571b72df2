//! Snapshot persistence.
//!
//! A store holds one family of daily snapshots (forecasts, min observations,
//! max observations, reconciled outputs), keyed by `YYYY-MM-DD`. Keys are
//! unique and documents are immutable once written.
//!
//! Submodules:
//! - `snapshot`: the `DailySnapshot` document and its JSON layout.
//! - `fs`      : one `<key>.json` file per snapshot in a directory.
//! - `memory`  : in-process store for tests and embedding.
//! - `pg`      : PostgreSQL table shared by all families.

pub mod fs;
pub mod memory;
pub mod pg;
pub mod snapshot;

pub use fs::FsSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use pg::PgSnapshotStore;
pub use snapshot::{CityEntry, DailySnapshot, is_date_key};

use crate::model::StoreError;

pub trait SnapshotStore {
    /// All snapshot keys, in no particular order.
    fn list_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Raw document for `key`.
    fn read(&self, key: &str) -> Result<String, StoreError>;

    /// Stores a new document. Fails with `AlreadyExists` if `key` is taken.
    fn write(&self, key: &str, document: &str) -> Result<(), StoreError>;

    fn read_snapshot(&self, key: &str) -> Result<DailySnapshot, StoreError> {
        DailySnapshot::from_json(key, &self.read(key)?)
    }

    fn write_snapshot(&self, snapshot: &DailySnapshot) -> Result<(), StoreError> {
        let document = snapshot.to_json().map_err(|e| StoreError::InvalidDocument {
            key: snapshot.key.clone(),
            message: e.to_string(),
        })?;
        self.write(&snapshot.key, &document)
    }
}

fn check_key(key: &str) -> Result<(), StoreError> {
    if is_date_key(key) {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
