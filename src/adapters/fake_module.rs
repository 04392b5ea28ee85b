use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ed25519_dalek::{Signer as _, SigningKey};
use parking_lot::Mutex;
use rand::RngCore;

use crate::error::{ModuleError, SignerResult};
use crate::logic::random_id;
use crate::model::{Pin, SignMechanism, TokenDescriptor, TokenStatus};
use crate::ports::{KeyConfig, KeyHandle, KeyManager, ModuleFinder, PinVerifier, Signer, TokenModule};

pub const FAKE_MODULE_TYPE: &str = "fake";

type KeyStore = Arc<Mutex<BTreeMap<String, SigningKey>>>;

fn random_signing_key() -> SigningKey {
    let mut secret = [0u8; 32];
    rand::rng().fill_bytes(&mut secret);
    SigningKey::from_bytes(&secret)
}

fn handle(key_id: &str, key: &SigningKey) -> KeyHandle {
    KeyHandle {
        key_id: key_id.to_string(),
        label: None,
        public_key: Some(key.verifying_key().to_bytes().to_vec()),
        sign_mechanism: SignMechanism::EdDsa,
    }
}

#[derive(Default)]
struct Slots {
    descriptors: Vec<TokenDescriptor>,
    keys: HashMap<String, KeyStore>,
}

/// In-memory stand-in for a hardware module with plug/unplug control
#[derive(Clone, Default)]
pub struct FakeModuleFinder {
    slots: Arc<Mutex<Slots>>,
}

impl FakeModuleFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a token with serial `token_id`
    pub fn plug(&self, token_id: &str) {
        let mut slots = self.slots.lock();
        slots.descriptors.push(TokenDescriptor {
            id: token_id.to_string(),
            module_type: FAKE_MODULE_TYPE.to_string(),
            serial_number: Some(token_id.to_string()),
            label: Some("fake".to_string()),
            slot_index: 0,
            read_only: false,
            batch_signing_enabled: false,
            sign_mechanism: SignMechanism::EdDsa,
            status: TokenStatus::Ok,
        });
        slots.keys.entry(token_id.to_string()).or_default();
    }

    pub fn unplug(&self, token_id: &str) {
        self.slots.lock().descriptors.retain(|d| d.id != token_id);
    }

    /// Put a key on the device behind the registry's back
    pub fn insert_key(&self, token_id: &str) -> KeyHandle {
        let store = self.store(token_id);
        let key_id = random_id();
        let key = random_signing_key();
        let handle = handle(&key_id, &key);
        store.lock().insert(key_id, key);
        handle
    }

    pub fn erase_key(&self, token_id: &str, key_id: &str) {
        self.store(token_id).lock().remove(key_id);
    }

    fn store(&self, token_id: &str) -> KeyStore {
        self.slots
            .lock()
            .keys
            .entry(token_id.to_string())
            .or_default()
            .clone()
    }
}

impl ModuleFinder for FakeModuleFinder {
    fn module_type(&self) -> &str {
        FAKE_MODULE_TYPE
    }

    fn list_available_slots(&self) -> SignerResult<Vec<TokenDescriptor>> {
        Ok(self.slots.lock().descriptors.clone())
    }

    fn open(&self, descriptor: &TokenDescriptor) -> SignerResult<Box<dyn TokenModule>> {
        Ok(Box::new(FakeTokenModule::with_store(
            &descriptor.id,
            self.store(&descriptor.id),
        )))
    }
}

/// PIN `1234`, Ed25519 keys in memory
pub struct FakeTokenModule {
    token_id: String,
    pin: Pin,
    unlocked: bool,
    keys: KeyStore,
}

impl FakeTokenModule {
    pub fn new(token_id: &str) -> Self {
        Self::with_store(token_id, KeyStore::default())
    }

    fn with_store(token_id: &str, keys: KeyStore) -> Self {
        Self {
            token_id: token_id.to_string(),
            pin: crate::ports::contract_tests::module_contract::pin(),
            unlocked: false,
            keys,
        }
    }

    fn ensure_unlocked(&self) -> SignerResult<()> {
        if !self.unlocked {
            return Err(ModuleError::NotLoggedIn {
                token_id: self.token_id.clone(),
            }
            .into());
        }
        Ok(())
    }
}

impl PinVerifier for FakeTokenModule {
    fn initialize(&mut self, pin: &Pin) -> SignerResult<()> {
        self.pin = pin.clone();
        Ok(())
    }

    fn unlock(&mut self, pin: &Pin) -> SignerResult<bool> {
        self.unlocked = pin == &self.pin;
        Ok(self.unlocked)
    }

    fn lock(&mut self) -> SignerResult<()> {
        self.unlocked = false;
        Ok(())
    }

    fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn status(&self) -> TokenStatus {
        TokenStatus::Ok
    }
}

impl KeyManager for FakeTokenModule {
    fn key_handles(&self) -> SignerResult<Vec<KeyHandle>> {
        Ok(self
            .keys
            .lock()
            .iter()
            .map(|(key_id, key)| handle(key_id, key))
            .collect())
    }

    fn generate_key(&mut self, config: &KeyConfig) -> SignerResult<KeyHandle> {
        self.ensure_unlocked()?;
        let key_id = random_id();
        let key = random_signing_key();
        let mut generated = handle(&key_id, &key);
        generated.label = config.label.clone();
        self.keys.lock().insert(key_id, key);
        Ok(generated)
    }

    fn delete_key(&mut self, key_id: &str) -> SignerResult<()> {
        self.ensure_unlocked()?;
        self.keys
            .lock()
            .remove(key_id)
            .map(|_| ())
            .ok_or_else(|| {
                ModuleError::KeyNotFound {
                    key_id: key_id.to_string(),
                }
                .into()
            })
    }
}

impl Signer for FakeTokenModule {
    fn sign(
        &mut self,
        key_id: &str,
        _mechanism: SignMechanism,
        digest: &[u8],
    ) -> SignerResult<Vec<u8>> {
        self.ensure_unlocked()?;
        let keys = self.keys.lock();
        let key = keys.get(key_id).ok_or_else(|| ModuleError::KeyNotFound {
            key_id: key_id.to_string(),
        })?;
        Ok(key.sign(digest).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract_tests_for;
    use crate::ports::contract_tests::module_contract;

    contract_tests_for!(
        fake_module_contract,
        make = || ((), FakeTokenModule::new("T1")),
        tests = {
            unlock_with_correct_pin => module_contract::test_unlock_success,
            unlock_with_wrong_pin => module_contract::test_unlock_wrong_pin,
            lock_forgets_login => module_contract::test_lock,
            generate_requires_login => module_contract::test_generate_key_requires_login,
            generate_and_sign => module_contract::test_generate_and_sign,
            sign_unknown_key => module_contract::test_sign_unknown_key,
            delete_key => module_contract::test_delete_key,
        }
    );

    #[test]
    fn test_opened_modules_share_device_keys() {
        let finder = FakeModuleFinder::new();
        finder.plug("T1");
        let inserted = finder.insert_key("T1");

        let descriptor = finder.list_available_slots().unwrap().remove(0);
        let module = finder.open(&descriptor).unwrap();
        assert_eq!(module.key_handles().unwrap(), vec![inserted]);

        finder.unplug("T1");
        assert!(finder.list_available_slots().unwrap().is_empty());
    }
}
