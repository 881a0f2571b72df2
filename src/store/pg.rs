//! PostgreSQL snapshot store.
//!
//! All families share one table; each `PgSnapshotStore` is a view onto a
//! single family. Stores for different families can share a connection.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use postgres::{Client, NoTls};

use super::{SnapshotStore, check_key};
use crate::model::StoreError;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS bomright_snapshots (
        family        TEXT        NOT NULL,
        snapshot_key  TEXT        NOT NULL,
        document      TEXT        NOT NULL,
        written_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (family, snapshot_key)
    )
";

pub struct PgSnapshotStore {
    client: Arc<Mutex<Client>>,
    family: String,
}

impl PgSnapshotStore {
    /// Opens a connection suitable for sharing between families.
    pub fn connect(database_url: &str) -> Result<Arc<Mutex<Client>>, StoreError> {
        let client = Client::connect(database_url, NoTls)?;
        Ok(Arc::new(Mutex::new(client)))
    }

    /// Store for `family`, creating the snapshot table if needed.
    pub fn new(client: Arc<Mutex<Client>>, family: &str) -> Result<Self, StoreError> {
        client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .batch_execute(CREATE_TABLE)?;

        Ok(PgSnapshotStore {
            client,
            family: family.to_string(),
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// When `key` was stored, if it exists.
    pub fn written_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let row = self.client().query_opt(
            "SELECT written_at FROM bomright_snapshots
             WHERE family = $1 AND snapshot_key = $2",
            &[&self.family, &key],
        )?;
        Ok(row.map(|r| r.get(0)))
    }

    fn client(&self) -> std::sync::MutexGuard<'_, Client> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SnapshotStore for PgSnapshotStore {
    fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.client().query(
            "SELECT snapshot_key FROM bomright_snapshots WHERE family = $1",
            &[&self.family],
        )?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    fn read(&self, key: &str) -> Result<String, StoreError> {
        let row = self.client().query_opt(
            "SELECT document FROM bomright_snapshots
             WHERE family = $1 AND snapshot_key = $2",
            &[&self.family, &key],
        )?;
        row.map(|r| r.get(0))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn write(&self, key: &str, document: &str) -> Result<(), StoreError> {
        check_key(key)?;
        let inserted = self.client().execute(
            "INSERT INTO bomright_snapshots (family, snapshot_key, document)
             VALUES ($1, $2, $3)
             ON CONFLICT (family, snapshot_key) DO NOTHING",
            &[&self.family, &key, &document],
        )?;

        if inserted == 0 {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }
        Ok(())
    }
}
