//! File-based snapshot storage

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::atomic_file::{io_error, write_atomically};
use crate::error::{PersistenceError, SignerResult};
use crate::logic::snapshot::{from_document, to_document, SnapshotDocument};
use crate::model::Token;
use crate::ports::SnapshotStore;

/// Modification time and length of the file as last seen
type Stamp = Option<(SystemTime, u64)>;

/// Snapshot kept as a pretty-printed JSON file
pub struct JsonSnapshotStore {
    path: PathBuf,
    seen: Mutex<Stamp>,
}

impl JsonSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn stamp(&self) -> Stamp {
        let meta = fs::metadata(&self.path).ok()?;
        Some((meta.modified().ok()?, meta.len()))
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> SignerResult<Vec<Token>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No snapshot at {}, starting empty", self.path.display());
                *self.seen.lock() = None;
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_error(&self.path, e).into()),
        };
        *self.seen.lock() = self.stamp();

        let document: SnapshotDocument =
            serde_json::from_str(&contents).map_err(PersistenceError::from)?;
        from_document(document)
    }

    fn save(&self, tokens: &[Token]) -> SignerResult<()> {
        let document = to_document(tokens);
        let contents =
            serde_json::to_string_pretty(&document).map_err(PersistenceError::from)?;

        let mut seen = self.seen.lock();
        write_atomically(&self.path, contents.as_bytes())?;
        *seen = self.stamp();
        info!(
            "Saved {} device(s) to {}",
            document.devices.len(),
            self.path.display()
        );
        Ok(())
    }

    fn has_changed(&self) -> bool {
        let current = self.stamp();
        current.is_some() && current != *self.seen.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewCertificate, TokenDescriptor, TokenStatus};
    use crate::registry::RegistryState;

    fn tokens_with_saved_cert() -> Vec<Token> {
        let mut state = RegistryState::new();
        state.create_token(&TokenDescriptor::software(TokenStatus::Ok));
        state.add_key("0", "K1", Some(vec![9; 32])).unwrap();
        state
            .add_certificate("K1", NewCertificate::new(vec![1, 2, 3]).saved(true))
            .unwrap();
        state.into_tokens()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("keyconf.json"));
        assert!(store.load().unwrap().is_empty());
        assert!(!store.has_changed());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("keyconf.json"));
        store.save(&tokens_with_saved_cert()).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].keys[0].public_key, Some(vec![9; 32]));
        assert!(!store.has_changed());

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"devices\""));
        assert!(raw.contains("\"keyId\": \"K1\""));
    }

    #[test]
    fn test_external_edit_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyconf.json");
        let store = JsonSnapshotStore::new(&path);
        store.save(&tokens_with_saved_cert()).unwrap();

        fs::write(&path, "{\"devices\": []}\n").unwrap();
        assert!(store.has_changed());
        assert!(store.load().unwrap().is_empty());
        assert!(!store.has_changed());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyconf.json");
        fs::write(&path, "not json").unwrap();

        let err = JsonSnapshotStore::new(&path).load().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PersistenceFailure);
    }
}
