use crate::config::Config;
use crate::error::{FaceGateError, Result};
use crate::recognizer::Encoding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const STORE_VERSION: u32 = 1;
const RECORD_EXTENSION: &str = "bin";

/// One persisted username-to-encoding association.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EncodingRecord {
    pub version: u32,
    pub username: String,
    pub encoding: Encoding,
}

/// File-per-record store mapping usernames to face encodings.
pub struct EncodingStore {
    data_dir: PathBuf,
}

impl EncodingStore {
    pub fn new_with_path(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn open(config: &Config) -> Result<Self> {
        Self::new_with_path(config.encodings_dir()?)
    }

    /// Saves an encoding for `username`, overwriting any existing record.
    pub fn save(&self, username: &str, encoding: &Encoding) -> Result<()> {
        let record = EncodingRecord {
            version: STORE_VERSION,
            username: username.to_string(),
            encoding: encoding.clone(),
        };
        let encoded = bincode::serialize(&record)
            .map_err(|e| FaceGateError::Storage(format!("Failed to serialize: {}", e)))?;
        fs::write(self.record_path(username), encoded)?;
        Ok(())
    }

    pub fn load(&self, username: &str) -> Result<EncodingRecord> {
        let record_file = self.record_path(username);
        if !record_file.exists() {
            return Err(FaceGateError::UserNotFound(username.to_string()));
        }

        let data = fs::read(record_file)?;
        let record: EncodingRecord = bincode::deserialize(&data)
            .map_err(|e| FaceGateError::Storage(format!("Failed to deserialize: {}", e)))?;
        Ok(record)
    }

    /// Loads every record, sorted by username. Corrupt records are skipped
    /// with a warning so one bad file cannot take verification down.
    pub fn load_all(&self) -> Result<Vec<EncodingRecord>> {
        let mut records = Vec::new();
        for username in self.list()? {
            match self.load(&username) {
                Ok(record) => records.push(record),
                Err(FaceGateError::Storage(msg)) => {
                    tracing::warn!("Skipping corrupt record for '{}': {}", username, msg);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    /// Removes the record for `username`, erroring if it does not exist.
    pub fn delete(&self, username: &str) -> Result<()> {
        let record_file = self.record_path(username);
        if !record_file.exists() {
            return Err(FaceGateError::UserNotFound(username.to_string()));
        }
        fs::remove_file(record_file)?;
        Ok(())
    }

    /// All registered usernames, sorted. Sorted order makes the
    /// first-match-wins comparison in verification deterministic.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut usernames = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    usernames.push(stem.to_string());
                }
            }
        }
        usernames.sort();
        Ok(usernames)
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    fn record_path(&self, username: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.{}", username, RECORD_EXTENSION))
    }
}

/// Normalizes operator input into a storable username: trim, lowercase,
/// then restrict to `[a-z0-9_-]`. The username becomes a filename component,
/// so anything outside that set is rejected.
pub fn normalize_username(raw: &str) -> Result<String> {
    let username = raw.trim().to_lowercase();
    if username.is_empty() {
        return Err(FaceGateError::InvalidUsername("empty username".into()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(FaceGateError::InvalidUsername(format!(
            "'{}' contains characters outside [a-z0-9_-]",
            username
        )));
    }
    Ok(username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, EncodingStore) {
        let dir = TempDir::new().unwrap();
        let store = EncodingStore::new_with_path(dir.path().join("encodings")).unwrap();
        (dir, store)
    }

    #[test]
    fn save_then_list_contains_username_once() {
        let (_dir, store) = temp_store();
        store.save("alice", &vec![0.1, 0.2, 0.3]).unwrap();
        store.save("bob", &vec![0.4, 0.5, 0.6]).unwrap();

        let users = store.list().unwrap();
        assert_eq!(users, vec!["alice".to_string(), "bob".to_string()]);
    }

    #[test]
    fn re_register_overwrites_encoding() {
        let (_dir, store) = temp_store();
        store.save("alice", &vec![1.0, 0.0]).unwrap();
        store.save("alice", &vec![0.0, 1.0]).unwrap();

        let records = store.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "alice");
        assert_eq!(records[0].encoding, vec![0.0, 1.0]);
    }

    #[test]
    fn delete_removes_record() {
        let (_dir, store) = temp_store();
        store.save("alice", &vec![1.0]).unwrap();
        store.delete("alice").unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn delete_missing_user_reports_not_found() {
        let (_dir, store) = temp_store();
        store.save("alice", &vec![1.0]).unwrap();

        match store.delete("bob") {
            Err(FaceGateError::UserNotFound(name)) => assert_eq!(name, "bob"),
            other => panic!("expected UserNotFound, got {:?}", other.map(|_| ())),
        }
        // Store unchanged.
        assert_eq!(store.list().unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn load_all_skips_corrupt_records() {
        let (_dir, store) = temp_store();
        store.save("alice", &vec![1.0, 2.0]).unwrap();
        std::fs::write(store.data_dir().join("mallory.bin"), b"not bincode").unwrap();

        let records = store.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].username, "alice");
    }

    #[test]
    fn load_all_returns_sorted_records() {
        let (_dir, store) = temp_store();
        store.save("zoe", &vec![1.0]).unwrap();
        store.save("alice", &vec![2.0]).unwrap();
        store.save("mike", &vec![3.0]).unwrap();

        let names: Vec<_> = store
            .load_all()
            .unwrap()
            .into_iter()
            .map(|r| r.username)
            .collect();
        assert_eq!(names, vec!["alice", "mike", "zoe"]);
    }

    #[test]
    fn record_round_trips_version() {
        let (_dir, store) = temp_store();
        store.save("alice", &vec![0.5; 128]).unwrap();
        let record = store.load("alice").unwrap();
        assert_eq!(record.version, STORE_VERSION);
        assert_eq!(record.encoding.len(), 128);
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_username("  Alice ").unwrap(), "alice");
        assert_eq!(normalize_username("bob_2").unwrap(), "bob_2");
    }

    #[test]
    fn normalize_rejects_empty_input() {
        assert!(normalize_username("   ").is_err());
    }

    #[test]
    fn normalize_rejects_path_traversal() {
        assert!(normalize_username("../etc/passwd").is_err());
        assert!(normalize_username("alice/..").is_err());
        assert!(normalize_username("alice bob").is_err());
    }
}
