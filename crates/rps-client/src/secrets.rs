//! Durable local storage for committed choices and nonces.
//!
//! The secret written here at commit time is the only thing that makes
//! the later reveal possible; it never leaves the local client. Layout
//! is one JSON file with two entries per slot: `choice{N}` (integer
//! move code) and `nonce{N}` (fixed-width hex).

use rps_core::{Choice, Nonce, Slot};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the secret store
#[derive(Debug, Error)]
pub enum SecretStoreError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("secret store is malformed: {0}")]
    Malformed(String),
}

/// A player's committed move and the nonce blinding it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSecret {
    pub choice: Choice,
    pub nonce: Nonce,
}

/// File-backed store, keyed by player slot.
///
/// `save` overwrites any prior secret for the slot, so callers must
/// only invoke it once per commit, immediately before submitting the
/// commitment. A missing entry at reveal time is terminal for the
/// protocol: the player cannot reveal and will eventually be forfeited
/// against.
pub struct ClientSecretStore {
    path: PathBuf,
}

impl ClientSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, slot: Slot, secret: &ClientSecret) -> Result<(), SecretStoreError> {
        // A corrupt file cannot be merged with; start from empty
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(SecretStoreError::Malformed(_)) => Map::new(),
            Err(err) => return Err(err),
        };
        entries.insert(
            format!("choice{}", slot.index()),
            Value::from(secret.choice.code()),
        );
        entries.insert(
            format!("nonce{}", slot.index()),
            Value::from(secret.nonce.to_hex()),
        );
        self.write_entries(&entries)
    }

    /// `Ok(None)` means no secret was ever written (or it was cleared):
    /// the unrecoverable condition, distinct from an I/O failure.
    pub fn load(&self, slot: Slot) -> Result<Option<ClientSecret>, SecretStoreError> {
        let entries = self.read_entries()?;
        let choice_entry = entries.get(&format!("choice{}", slot.index()));
        let nonce_entry = entries.get(&format!("nonce{}", slot.index()));
        let (Some(choice_entry), Some(nonce_entry)) = (choice_entry, nonce_entry) else {
            return Ok(None);
        };

        let choice = choice_entry
            .as_u64()
            .and_then(|code| u8::try_from(code).ok())
            .and_then(Choice::from_code)
            .ok_or_else(|| {
                SecretStoreError::Malformed(format!("bad choice entry for slot {slot}"))
            })?;
        let nonce = nonce_entry
            .as_str()
            .and_then(Nonce::from_hex)
            .ok_or_else(|| {
                SecretStoreError::Malformed(format!("bad nonce entry for slot {slot}"))
            })?;

        Ok(Some(ClientSecret { choice, nonce }))
    }

    pub fn clear(&self, slot: Slot) -> Result<(), SecretStoreError> {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(SecretStoreError::Malformed(_)) => Map::new(),
            Err(err) => return Err(err),
        };
        entries.remove(&format!("choice{}", slot.index()));
        entries.remove(&format!("nonce{}", slot.index()));
        self.write_entries(&entries)
    }

    fn read_entries(&self) -> Result<Map<String, Value>, SecretStoreError> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|err| SecretStoreError::Malformed(err.to_string())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Map::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_entries(&self, entries: &Map<String, Value>) -> Result<(), SecretStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|err| SecretStoreError::Malformed(err.to_string()))?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &tempfile::TempDir) -> ClientSecretStore {
        ClientSecretStore::new(dir.path().join("secrets.json"))
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let secret = ClientSecret {
            choice: Choice::Paper,
            nonce: Nonce::random(),
        };

        store.save(Slot::A, &secret).unwrap();
        assert_eq!(store.load(Slot::A).unwrap(), Some(secret));
        assert_eq!(store.load(Slot::B).unwrap(), None);
    }

    #[test]
    fn test_slots_are_independent() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let secret_a = ClientSecret {
            choice: Choice::Rock,
            nonce: Nonce::random(),
        };
        let secret_b = ClientSecret {
            choice: Choice::Scissors,
            nonce: Nonce::random(),
        };

        store.save(Slot::A, &secret_a).unwrap();
        store.save(Slot::B, &secret_b).unwrap();

        assert_eq!(store.load(Slot::A).unwrap(), Some(secret_a));
        assert_eq!(store.load(Slot::B).unwrap(), Some(secret_b));
    }

    #[test]
    fn test_save_overwrites_prior_secret() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let first = ClientSecret {
            choice: Choice::Rock,
            nonce: Nonce::random(),
        };
        let second = ClientSecret {
            choice: Choice::Scissors,
            nonce: Nonce::random(),
        };

        store.save(Slot::A, &first).unwrap();
        store.save(Slot::A, &second).unwrap();

        assert_eq!(store.load(Slot::A).unwrap(), Some(second));
    }

    #[test]
    fn test_clear_removes_only_that_slot() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let secret = ClientSecret {
            choice: Choice::Paper,
            nonce: Nonce::random(),
        };

        store.save(Slot::A, &secret).unwrap();
        store.save(Slot::B, &secret).unwrap();
        store.clear(Slot::A).unwrap();

        assert_eq!(store.load(Slot::A).unwrap(), None);
        assert_eq!(store.load(Slot::B).unwrap(), Some(secret));
    }

    #[test]
    fn test_never_written_store_loads_nothing() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.load(Slot::A).unwrap(), None);
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), b"not json").unwrap();

        assert!(matches!(
            store.load(Slot::A),
            Err(SecretStoreError::Malformed(_))
        ));
    }

    #[test]
    fn test_corrupt_entry_is_reported() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), br#"{"choice0": 9, "nonce0": "abc"}"#).unwrap();

        assert!(matches!(
            store.load(Slot::A),
            Err(SecretStoreError::Malformed(_))
        ));
    }
}
