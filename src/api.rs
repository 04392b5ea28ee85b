//! Consumer-facing API
//!
//! [`CredentialService`] wires the registry, the module manager and the
//! status tracker together and exposes the operations an outer signing or
//! RPC layer needs.

use std::sync::Arc;

use tracing::info;

use crate::adapters::{JsonSnapshotStore, SoftwareTokenFinder};
use crate::authorization::{self, SelectionPolicy, SigningCandidate};
use crate::config::SignerConfig;
use crate::error::SignerResult;
use crate::model::{
    Cert, CertRequestOutcome, ClientId, Key, KeyUsage, NewCertRequest, Pin, Token,
    SOFTWARE_TOKEN_ID,
};
use crate::modules::ModuleManager;
use crate::ports::{KeyConfig, ModuleFinder};
use crate::registry::TokenRegistry;
use crate::tracker::StatusTracker;
use crate::use_cases::{self, ImportOptions, MemberSignature};

pub struct CredentialService {
    registry: Arc<TokenRegistry>,
    modules: ModuleManager,
    policy: SelectionPolicy,
    tracker: StatusTracker,
}

impl CredentialService {
    pub fn new(registry: Arc<TokenRegistry>, modules: ModuleManager, policy: SelectionPolicy) -> Self {
        let tracker = StatusTracker::new(registry.clone());
        Self {
            registry,
            modules,
            policy,
            tracker,
        }
    }

    /// Load the snapshot named by `config`, attach the configured modules and run a first discovery
    ///
    /// # Errors
    ///
    /// Returns errors if the configuration is invalid or the first
    /// discovery cannot update the registry.
    pub fn from_config(config: &SignerConfig) -> SignerResult<Self> {
        config.validate()?;

        let store = Arc::new(JsonSnapshotStore::new(&config.key_conf_path));
        let registry = Arc::new(TokenRegistry::load(store).with_autosave(config.autosave));

        #[cfg_attr(not(feature = "piv"), allow(unused_mut))]
        let mut finders: Vec<Arc<dyn ModuleFinder>> = vec![Arc::new(SoftwareTokenFinder::new(
            &config.software_token_dir,
            config.pin_kdf_rounds,
        ))];
        #[cfg(feature = "piv")]
        if config.piv_enabled {
            finders.push(Arc::new(crate::adapters::PivTokenFinder));
        }

        let service = Self::new(registry, ModuleManager::new(finders), config.selection_policy);
        service.refresh()?;
        info!("Credential service ready");
        Ok(service)
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Reconcile the registry with the modules
    pub fn refresh(&self) -> SignerResult<()> {
        use_cases::refresh(&self.registry, &self.modules)
    }

    /// Pick up changes another process wrote to the snapshot
    ///
    /// Returns the certificates that appeared.
    pub fn reload(&self) -> SignerResult<Vec<Cert>> {
        self.registry.merge_from_store()
    }

    pub fn persist(&self) -> SignerResult<()> {
        self.registry.persist()
    }

    // Queries

    pub fn list_tokens(&self) -> Vec<Token> {
        self.registry.list_tokens()
    }

    pub fn list_keys(&self, token_id: &str) -> SignerResult<Vec<Key>> {
        self.registry.list_keys(token_id)
    }

    pub fn list_certificates(&self, member_id: &ClientId) -> Vec<Cert> {
        self.registry.list_certificates(member_id)
    }

    pub fn get_token(&self, token_id: &str) -> SignerResult<Token> {
        self.registry.get_token(token_id)
    }

    pub fn get_key(&self, key_id: &str) -> SignerResult<Key> {
        self.registry.get_key(key_id)
    }

    pub fn get_certificate(&self, cert_id: &str) -> SignerResult<Cert> {
        self.registry.get_certificate(cert_id)
    }

    /// The key and certificate that would sign for `member` right now
    pub fn find_signing_key(&self, member: &ClientId) -> Option<SigningCandidate> {
        self.registry
            .read(|state| authorization::find_signing_candidate(state, member, self.policy))
    }

    pub fn can_sign_for(&self, key_id: &str, member: &ClientId) -> bool {
        self.registry
            .read(|state| authorization::can_sign_for(state, key_id, member))
    }

    // Tokens

    /// Set the PIN of the software token, then rediscover it
    pub fn initialize_software_token(&self, pin: &Pin) -> SignerResult<()> {
        use_cases::initialize_token(&self.registry, &self.modules, SOFTWARE_TOKEN_ID, pin)?;
        self.refresh()
    }

    pub fn activate_token(&self, token_id: &str, pin: &Pin) -> SignerResult<()> {
        use_cases::activate_token(&self.registry, &self.modules, token_id, pin)
    }

    pub fn deactivate_token(&self, token_id: &str) -> SignerResult<()> {
        use_cases::deactivate_token(&self.registry, &self.modules, token_id)
    }

    pub fn set_token_friendly_name(&self, token_id: &str, friendly_name: &str) -> SignerResult<()> {
        self.registry.set_token_friendly_name(token_id, friendly_name)
    }

    // Keys

    pub fn generate_key(&self, token_id: &str, label: Option<&str>) -> SignerResult<Key> {
        let config = KeyConfig {
            label: label.map(str::to_string),
            mechanism: None,
        };
        use_cases::generate_key(&self.registry, &self.modules, token_id, &config)
    }

    pub fn delete_key(&self, key_id: &str, from_module: bool) -> SignerResult<()> {
        use_cases::delete_key(&self.registry, &self.modules, key_id, from_module)
    }

    pub fn set_key_friendly_name(&self, key_id: &str, friendly_name: &str) -> SignerResult<()> {
        self.registry.set_key_friendly_name(key_id, friendly_name)
    }

    // Certificates and requests

    pub fn request_certificate(
        &self,
        key_id: &str,
        usage: KeyUsage,
        request: NewCertRequest,
    ) -> SignerResult<CertRequestOutcome> {
        use_cases::request_certificate(&self.registry, key_id, usage, request)
    }

    pub fn delete_cert_request(&self, request_id: &str) -> SignerResult<String> {
        use_cases::delete_cert_request(&self.registry, request_id)
    }

    pub fn import_certificate(&self, der: &[u8], options: ImportOptions) -> SignerResult<Cert> {
        use_cases::import_certificate(&self.registry, der, options)
    }

    pub fn set_certificate_active(&self, cert_id: &str, active: bool) -> SignerResult<()> {
        self.registry.set_certificate_active(cert_id, active)
    }

    pub fn delete_certificate(&self, cert_id: &str) -> SignerResult<()> {
        use_cases::delete_certificate(&self.registry, cert_id)
    }

    // Signing

    pub fn sign(&self, key_id: &str, digest: &[u8]) -> SignerResult<Vec<u8>> {
        use_cases::sign_with_key(&self.registry, &self.modules, key_id, digest)
    }

    pub fn sign_for_member(&self, member: &ClientId, digest: &[u8]) -> SignerResult<MemberSignature> {
        use_cases::sign_for_member(&self.registry, &self.modules, member, self.policy, digest)
    }
}
