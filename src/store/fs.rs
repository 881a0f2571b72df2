//! Directory-backed snapshot store: `<dir>/<YYYY-MM-DD>.json`.
//!
//! Documents are written to a temporary file in the same directory and then
//! linked into place, so a key either holds a complete document or does not
//! exist.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{SnapshotStore, check_key, is_date_key};
use crate::model::StoreError;

#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FsSnapshotStore { dir: dir.into() }
    }

    /// Store for one family under a shared data directory.
    pub fn family(data_dir: &Path, family: &str) -> Self {
        Self::new(data_dir.join(family))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SnapshotStore for FsSnapshotStore {
    /// Only `<date>.json` files count; anything else in the directory is ignored.
    fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if is_date_key(stem) {
                    keys.push(stem.to_string());
                }
            }
        }
        Ok(keys)
    }

    fn read(&self, key: &str) -> Result<String, StoreError> {
        check_key(key)?;
        fs::read_to_string(self.path_for(key)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
            _ => StoreError::Io(e),
        })
    }

    fn write(&self, key: &str, document: &str) -> Result<(), StoreError> {
        check_key(key)?;
        fs::create_dir_all(&self.dir)?;

        let mut staged = tempfile::Builder::new()
            .prefix(".")
            .suffix(".partial")
            .tempfile_in(&self.dir)?;
        staged.write_all(document.as_bytes())?;
        staged.write_all(b"\n")?;
        staged.as_file().sync_all()?;

        // Dropping the staged file on error removes it.
        staged
            .persist_noclobber(self.path_for(key))
            .map_err(|e| match e.error.kind() {
                ErrorKind::AlreadyExists => StoreError::AlreadyExists(key.to_string()),
                _ => StoreError::Io(e.error),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_directory_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::family(tmp.path(), "forecasts");
        assert!(store.list_keys().unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::family(tmp.path(), "max_obs");

        store.write("2023-03-21", r#"{"day": "2023-03-21", "MEL": 20.0}"#).unwrap();

        assert_eq!(store.list_keys().unwrap(), vec!["2023-03-21".to_string()]);
        assert!(store.read("2023-03-21").unwrap().contains("\"MEL\": 20.0"));
        assert!(tmp.path().join("max_obs/2023-03-21.json").exists());
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(tmp.path());

        store.write("2023-03-21", "{}").unwrap();
        let err = store.write("2023-03-21", "{}").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(k) if k == "2023-03-21"));
    }

    #[test]
    fn test_rejected_write_keeps_original_and_leaves_no_residue() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(tmp.path());

        store.write("2023-03-21", r#"{"day": "2023-03-21", "MEL": 20.0}"#).unwrap();
        assert!(store.write("2023-03-21", r#"{"day": "2023-03-21"}"#).is_err());

        assert!(store.read("2023-03-21").unwrap().contains("\"MEL\": 20.0"));
        let names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2023-03-21.json".to_string()]);
    }

    #[test]
    fn test_abandoned_partial_write_does_not_block_key() {
        let tmp = tempfile::tempdir().unwrap();
        // What an interrupted write leaves behind.
        fs::write(tmp.path().join(".tmpX1y2Z3.partial"), r#"{"day": "2023-03-2"#).unwrap();

        let store = FsSnapshotStore::new(tmp.path());
        assert!(store.list_keys().unwrap().is_empty());

        store.write("2023-03-21", r#"{"day": "2023-03-21"}"#).unwrap();
        assert_eq!(store.list_keys().unwrap(), vec!["2023-03-21".to_string()]);
        assert_eq!(store.read_snapshot("2023-03-21").unwrap().day, "2023-03-21");
    }

    #[test]
    fn test_non_snapshot_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("2023-03-20.json"), "{}").unwrap();
        fs::write(tmp.path().join("notes.json"), "{}").unwrap();
        fs::write(tmp.path().join("2023-03-21.png"), "").unwrap();

        let store = FsSnapshotStore::new(tmp.path());
        assert_eq!(store.list_keys().unwrap(), vec!["2023-03-20".to_string()]);
    }

    #[test]
    fn test_read_missing_and_invalid_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(tmp.path());

        assert!(matches!(store.read("2023-03-21"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.read("../secret"), Err(StoreError::InvalidKey(_))));
    }
}
