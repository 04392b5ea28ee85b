//! The token registry: one lock around the whole token hierarchy
//!
//! Every read and write goes through [`TokenRegistry::read`] or one of the
//! write paths, so callers never observe a half-applied mutation and all
//! mutations are totally ordered. Persistence copies the state under the
//! lock and writes the copy after releasing it.

mod state;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::error::SignerResult;
use crate::logic::merge_onto_file_tokens;
use crate::model::{
    Cert, CertRequestOutcome, CertStatus, ClientId, Key, KeyUsage, NewCertRequest, NewCertificate,
    OcspResponse, Token, TokenDescriptor, TokenStatus,
};
use crate::ports::SnapshotStore;

pub use state::RegistryState;

const MERGE_ATTEMPTS: u32 = 3;

struct Guarded {
    state: RegistryState,
    /// Bumped by every mutation of persisted fields
    generation: u64,
}

pub struct TokenRegistry {
    inner: Mutex<Guarded>,
    store: Option<Arc<dyn SnapshotStore>>,
    /// Generation of the last snapshot written; serializes writers
    written: Mutex<u64>,
    autosave: bool,
}

impl TokenRegistry {
    /// Registry without durable storage
    pub fn in_memory() -> Self {
        Self::from_parts(RegistryState::new(), None)
    }

    /// Rebuild the registry from `store`
    ///
    /// A snapshot that cannot be read is logged and the registry starts
    /// empty, so the process still comes up.
    pub fn load(store: Arc<dyn SnapshotStore>) -> Self {
        let state = match store.load() {
            Ok(tokens) => {
                info!("Loaded {} token(s) from snapshot", tokens.len());
                RegistryState::from_tokens(tokens)
            }
            Err(e) => {
                error!("Failed to load token snapshot, starting empty: {e}");
                RegistryState::new()
            }
        };
        Self::from_parts(state, Some(store))
    }

    fn from_parts(state: RegistryState, store: Option<Arc<dyn SnapshotStore>>) -> Self {
        Self {
            inner: Mutex::new(Guarded {
                state,
                generation: 0,
            }),
            store,
            written: Mutex::new(0),
            autosave: true,
        }
    }

    /// Persist after each mutation of persisted fields (default) or only on [`persist`](Self::persist)
    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    /// Run `f` against a consistent view of the registry
    pub fn read<R>(&self, f: impl FnOnce(&RegistryState) -> R) -> R {
        f(&self.inner.lock().state)
    }

    /// Copy of the whole registry
    pub fn snapshot(&self) -> RegistryState {
        self.read(RegistryState::clone)
    }

    /// Apply a runtime-only mutation; nothing is written to disk
    fn update<R>(&self, f: impl FnOnce(&mut RegistryState) -> SignerResult<R>) -> SignerResult<R> {
        f(&mut self.inner.lock().state)
    }

    /// Apply a mutation of persisted fields, then write the snapshot
    ///
    /// A failed write is returned to the caller; the in-memory change stays.
    fn update_persisted<R>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> SignerResult<R>,
    ) -> SignerResult<R> {
        let (result, pending) = {
            let mut guard = self.inner.lock();
            let result = f(&mut guard.state)?;
            guard.generation += 1;
            let pending = (self.autosave && self.store.is_some())
                .then(|| (guard.generation, guard.state.tokens().to_vec()));
            (result, pending)
        };

        if let Some((generation, tokens)) = pending {
            self.write_snapshot(generation, &tokens)?;
        }
        Ok(result)
    }

    /// Write the current state to the snapshot store
    pub fn persist(&self) -> SignerResult<()> {
        let (generation, tokens) = {
            let guard = self.inner.lock();
            (guard.generation, guard.state.tokens().to_vec())
        };
        self.write_snapshot(generation, &tokens)
    }

    fn write_snapshot(&self, generation: u64, tokens: &[Token]) -> SignerResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let mut written = self.written.lock();
        if generation < *written {
            debug!("Skipping snapshot generation {generation}, {} already written", *written);
            return Ok(());
        }
        store.save(tokens)?;
        *written = generation;
        debug!("Wrote snapshot generation {generation}");
        Ok(())
    }

    /// Reload the snapshot if another process changed it and merge it in
    ///
    /// The file is read outside the registry lock. If a mutation of
    /// persisted fields lands meanwhile, the file is read again once that
    /// mutation's own snapshot is written, so the merge never overlays a
    /// file older than memory.
    ///
    /// Returns the certificates that appeared in the file.
    pub fn merge_from_store(&self) -> SignerResult<Vec<Cert>> {
        let Some(store) = &self.store else {
            return Ok(Vec::new());
        };
        if !store.has_changed() {
            return Ok(Vec::new());
        }

        for attempt in 1..=MERGE_ATTEMPTS {
            let generation = self.inner.lock().generation;
            let file_tokens = store.load()?;

            let mut guard = self.inner.lock();
            let unsaved = self.autosave && *self.written.lock() < guard.generation;
            if guard.generation != generation || unsaved {
                debug!("Registry changed while reading the snapshot (attempt {attempt})");
                continue;
            }

            let outcome = merge_onto_file_tokens(file_tokens, guard.state.tokens());
            guard.state.replace_tokens(outcome.tokens);
            info!(
                "Merged snapshot from disk, {} new certificate(s)",
                outcome.added_certs.len()
            );
            return Ok(outcome.added_certs);
        }

        warn!("Snapshot kept changing under concurrent writes, merge skipped");
        Ok(Vec::new())
    }

    // Reads

    pub fn list_tokens(&self) -> Vec<Token> {
        trace!("list_tokens()");
        self.read(|state| state.tokens().to_vec())
    }

    pub fn list_keys(&self, token_id: &str) -> SignerResult<Vec<Key>> {
        trace!("list_keys({token_id})");
        self.read(|state| Ok(state.token(token_id)?.keys.clone()))
    }

    pub fn list_certificates(&self, member_id: &ClientId) -> Vec<Cert> {
        trace!("list_certificates({member_id})");
        self.read(|state| state.certificates_for_member(member_id))
    }

    pub fn get_token(&self, token_id: &str) -> SignerResult<Token> {
        self.read(|state| state.token(token_id).cloned())
    }

    pub fn get_key(&self, key_id: &str) -> SignerResult<Key> {
        self.read(|state| state.key(key_id).cloned())
    }

    pub fn get_token_for_key(&self, key_id: &str) -> SignerResult<Token> {
        self.read(|state| state.token_for_key(key_id).cloned())
    }

    pub fn get_certificate(&self, cert_id: &str) -> SignerResult<Cert> {
        self.read(|state| state.cert(cert_id).cloned())
    }

    pub fn get_certificate_by_hash(&self, cert_hash: &str) -> SignerResult<Cert> {
        self.read(|state| state.cert_by_hash(cert_hash).cloned())
    }

    pub fn get_key_for_cert_request(&self, request_id: &str) -> SignerResult<Key> {
        self.read(|state| state.key_for_cert_request(request_id).cloned())
    }

    pub fn find_key_by_public_key(&self, public_key: &[u8]) -> Option<Key> {
        self.read(|state| state.key_by_public_key(public_key).cloned())
    }

    pub fn is_batch_signing_enabled(&self, key_id: &str) -> SignerResult<bool> {
        self.read(|state| Ok(state.token_for_key(key_id)?.batch_signing_enabled))
    }

    // Runtime state driven by module events

    pub fn create_token(&self, descriptor: &TokenDescriptor) -> Token {
        self.inner.lock().state.create_token(descriptor)
    }

    pub fn set_token_available(&self, token_id: &str, available: bool) -> SignerResult<()> {
        self.update(|state| state.set_token_available(token_id, available))
    }

    pub fn set_token_active(&self, token_id: &str, active: bool) -> SignerResult<()> {
        self.update(|state| state.set_token_active(token_id, active))
    }

    pub fn set_token_status(&self, token_id: &str, status: TokenStatus) -> SignerResult<()> {
        self.update(|state| state.set_token_status(token_id, status))
    }

    pub fn set_key_available(&self, key_id: &str, available: bool) -> SignerResult<()> {
        self.update(|state| state.set_key_available(key_id, available))
    }

    pub fn set_ocsp_response(&self, cert_hash: &str, response: OcspResponse) -> SignerResult<()> {
        self.update(|state| state.set_ocsp_response(cert_hash, response))
    }

    // Persisted state

    pub fn set_token_friendly_name(&self, token_id: &str, friendly_name: &str) -> SignerResult<()> {
        self.update_persisted(|state| state.set_token_friendly_name(token_id, friendly_name))
    }

    pub fn add_key(
        &self,
        token_id: &str,
        key_id: &str,
        public_key: Option<Vec<u8>>,
    ) -> SignerResult<Key> {
        self.update_persisted(|state| state.add_key(token_id, key_id, public_key))
    }

    pub fn remove_key(&self, key_id: &str) -> SignerResult<bool> {
        self.update_persisted(|state| Ok(state.remove_key(key_id)))
    }

    pub fn set_key_friendly_name(&self, key_id: &str, friendly_name: &str) -> SignerResult<()> {
        self.update_persisted(|state| state.set_key_friendly_name(key_id, friendly_name))
    }

    pub fn set_key_label(&self, key_id: &str, label: &str) -> SignerResult<()> {
        self.update_persisted(|state| state.set_key_label(key_id, label))
    }

    pub fn set_public_key(&self, key_id: &str, public_key: Vec<u8>) -> SignerResult<()> {
        self.update_persisted(|state| state.set_public_key(key_id, public_key))
    }

    pub fn set_key_usage(&self, key_id: &str, usage: KeyUsage) -> SignerResult<()> {
        self.update_persisted(|state| state.set_key_usage(key_id, usage))
    }

    pub fn add_certificate(&self, key_id: &str, certificate: NewCertificate) -> SignerResult<Cert> {
        self.update_persisted(|state| state.add_certificate(key_id, certificate))
    }

    pub fn remove_certificate(&self, cert_id: &str) -> SignerResult<bool> {
        self.update_persisted(|state| Ok(state.remove_certificate(cert_id)))
    }

    pub fn set_certificate_active(&self, cert_id: &str, active: bool) -> SignerResult<()> {
        self.update_persisted(|state| state.set_certificate_active(cert_id, active))
    }

    pub fn set_certificate_status(&self, cert_id: &str, status: CertStatus) -> SignerResult<()> {
        self.update_persisted(|state| state.set_certificate_status(cert_id, status))
    }

    pub fn set_ocsp_verify_before_activation_error(
        &self,
        cert_id: &str,
        error: Option<String>,
    ) -> SignerResult<()> {
        self.update_persisted(|state| state.set_ocsp_verify_before_activation_error(cert_id, error))
    }

    pub fn set_renewed_cert_hash(&self, cert_id: &str, hash: Option<String>) -> SignerResult<()> {
        self.update_persisted(|state| state.set_renewed_cert_hash(cert_id, hash))
    }

    pub fn set_renewal_error(&self, cert_id: &str, error: Option<String>) -> SignerResult<()> {
        self.update_persisted(|state| state.set_renewal_error(cert_id, error))
    }

    pub fn set_next_planned_renewal(
        &self,
        cert_id: &str,
        next_renewal_time: Option<DateTime<Utc>>,
    ) -> SignerResult<()> {
        self.update_persisted(|state| state.set_next_planned_renewal(cert_id, next_renewal_time))
    }

    pub fn add_certificate_request(
        &self,
        key_id: &str,
        usage: KeyUsage,
        request: NewCertRequest,
    ) -> SignerResult<CertRequestOutcome> {
        self.update_persisted(|state| state.add_certificate_request(key_id, usage, request))
    }

    pub fn remove_certificate_request(&self, request_id: &str) -> SignerResult<Option<String>> {
        self.update_persisted(|state| Ok(state.remove_certificate_request(request_id)))
    }

    /// Run several mutations under one lock acquisition, then persist once
    ///
    /// Changes made before an error are kept, as with single mutations.
    pub fn batch<R>(
        &self,
        f: impl FnOnce(&mut RegistryState) -> SignerResult<R>,
    ) -> SignerResult<R> {
        self.update_persisted(f)
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}
