use parking_lot::Mutex;

use crate::error::{PersistenceError, SignerResult};
use crate::logic::snapshot::{from_document, to_document, SnapshotDocument};
use crate::model::Token;
use crate::ports::SnapshotStore;

#[derive(Debug, Default)]
struct Inner {
    document: Option<String>,
    saves: usize,
    fail_saves: bool,
    changed: bool,
}

/// Snapshot store keeping the serialized document in memory
///
/// Goes through the same JSON mapping as the file store. Saves can be
/// counted or made to fail, and the document replaced behind the
/// registry's back.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    inner: Mutex<Inner>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store starting from a raw document, which may be malformed
    pub fn with_document(document: &str) -> Self {
        Self {
            inner: Mutex::new(Inner {
                document: Some(document.to_string()),
                ..Inner::default()
            }),
        }
    }

    pub fn save_count(&self) -> usize {
        self.inner.lock().saves
    }

    /// Make subsequent saves fail with a persistence error
    pub fn fail_saves(&self, fail: bool) {
        self.inner.lock().fail_saves = fail;
    }

    /// Overwrite the document as another process would
    pub fn replace_externally(&self, tokens: &[Token]) {
        let document = serde_json::to_string_pretty(&to_document(tokens)).ok();
        let mut inner = self.inner.lock();
        inner.document = document;
        inner.changed = true;
    }

    /// Raw document as last written
    pub fn document(&self) -> Option<String> {
        self.inner.lock().document.clone()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> SignerResult<Vec<Token>> {
        let mut inner = self.inner.lock();
        inner.changed = false;
        let Some(document) = &inner.document else {
            return Ok(Vec::new());
        };
        let document: SnapshotDocument =
            serde_json::from_str(document).map_err(PersistenceError::from)?;
        from_document(document)
    }

    fn save(&self, tokens: &[Token]) -> SignerResult<()> {
        let mut inner = self.inner.lock();
        if inner.fail_saves {
            return Err(PersistenceError::InvalidContent {
                reason: "saving is disabled".to_string(),
            }
            .into());
        }
        let document =
            serde_json::to_string_pretty(&to_document(tokens)).map_err(PersistenceError::from)?;
        inner.document = Some(document);
        inner.saves += 1;
        inner.changed = false;
        Ok(())
    }

    fn has_changed(&self) -> bool {
        self.inner.lock().changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TokenDescriptor, TokenStatus};

    #[test]
    fn test_empty_store_loads_nothing() {
        let store = MemorySnapshotStore::new();
        assert!(store.load().unwrap().is_empty());
        assert!(!store.has_changed());
    }

    #[test]
    fn test_external_replace_marks_changed() {
        let store = MemorySnapshotStore::new();
        let token = Token::from_descriptor(&TokenDescriptor::software(TokenStatus::Ok));
        store.replace_externally(&[token]);
        assert!(store.has_changed());

        store.load().unwrap();
        assert!(!store.has_changed());
    }

    #[test]
    fn test_malformed_document_fails_load() {
        let store = MemorySnapshotStore::with_document("{\"devices\": 42}");
        assert!(store.load().is_err());
    }
}
