//! Per-key-handle persistent monotonic counters (spec.md §9 open issue).
//!
//! The distilled spec's reference host hard-codes the counter returned to
//! relying parties to 1; spec.md's Non-goals only exclude *on-device*
//! counter persistence, and §9 explicitly invites a real implementer to add
//! host-side persistence. This is a deliberate supplement, not a feature
//! the original spec asked for — see DESIGN.md.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Default)]
struct CounterFile {
    counters: HashMap<String, u32>,
}

pub struct CounterStore {
    path: PathBuf,
    file: CounterFile,
}

fn handle_key(key_handle: &[u8]) -> String {
    hex::encode(Sha256::digest(key_handle))
}

impl CounterStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CounterError> {
        let path = path.into();
        let file = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CounterFile::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, file })
    }

    /// Data directory the production agent stores its counter file under,
    /// following the teacher's `directories::ProjectDirs` convention.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("se", "tillitis", "tkey-fido")
            .map(|dirs| dirs.data_dir().join("counters.json"))
    }

    /// Returns the next counter value for `key_handle` and persists the
    /// increment. Starts at 1 for a never-seen handle.
    pub fn next(&mut self, key_handle: &[u8]) -> Result<u32, CounterError> {
        let key = handle_key(key_handle);
        let counter = self.file.counters.entry(key).or_insert(0);
        *counter += 1;
        let value = *counter;
        self.persist()?;
        Ok(value)
    }

    fn persist(&self) -> Result<(), CounterError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&self.file)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_one_and_increments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        let mut store = CounterStore::open(&path).unwrap();
        let handle = [1u8; 64];
        assert_eq!(store.next(&handle).unwrap(), 1);
        assert_eq!(store.next(&handle).unwrap(), 2);
    }

    #[test]
    fn counters_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        let handle = [2u8; 64];
        {
            let mut store = CounterStore::open(&path).unwrap();
            store.next(&handle).unwrap();
            store.next(&handle).unwrap();
        }
        let mut reopened = CounterStore::open(&path).unwrap();
        assert_eq!(reopened.next(&handle).unwrap(), 3);
    }

    #[test]
    fn distinct_handles_have_independent_counters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counters.json");
        let mut store = CounterStore::open(&path).unwrap();
        assert_eq!(store.next(&[1u8; 64]).unwrap(), 1);
        assert_eq!(store.next(&[2u8; 64]).unwrap(), 1);
    }
}
