//! Software token: Ed25519 keys sealed under the token PIN
//!
//! The token directory holds a PIN marker file and one sealed file per key.
//! Public keys sit outside the ciphertext, so keys can be listed while the
//! token is locked; signing needs the PIN.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signer as _, SigningKey};
use rand::RngCore;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::atomic_file::{io_error, write_atomically};
use super::sealed_key::SealedKey;
use crate::error::{CryptoError, ModuleError, SignerError, SignerResult};
use crate::logic::random_id;
use crate::model::{Pin, SignMechanism, TokenDescriptor, TokenStatus, SOFTWARE_MODULE_TYPE, SOFTWARE_TOKEN_ID};
use crate::ports::{KeyConfig, KeyHandle, KeyManager, ModuleFinder, PinVerifier, Signer, TokenModule};

const PIN_MARKER: &str = ".softtoken";
const PIN_MARKER_CONTENT: &[u8] = b"tokensign software token";
const KEY_EXTENSION: &str = "key";

/// Finder for the single software token
#[derive(Debug, Clone)]
pub struct SoftwareTokenFinder {
    dir: PathBuf,
    kdf_rounds: u32,
}

impl SoftwareTokenFinder {
    pub fn new(dir: impl Into<PathBuf>, kdf_rounds: u32) -> Self {
        Self {
            dir: dir.into(),
            kdf_rounds,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ModuleFinder for SoftwareTokenFinder {
    fn module_type(&self) -> &str {
        SOFTWARE_MODULE_TYPE
    }

    fn list_available_slots(&self) -> SignerResult<Vec<TokenDescriptor>> {
        let status = if self.dir.join(PIN_MARKER).exists() {
            TokenStatus::Ok
        } else {
            TokenStatus::NotInitialized
        };
        Ok(vec![TokenDescriptor::software(status)])
    }

    fn open(&self, descriptor: &TokenDescriptor) -> SignerResult<Box<dyn TokenModule>> {
        if descriptor.id != SOFTWARE_TOKEN_ID {
            return Err(ModuleError::Unavailable {
                token_id: descriptor.id.clone(),
            }
            .into());
        }
        Ok(Box::new(SoftwareTokenModule::new(
            self.dir.clone(),
            self.kdf_rounds,
        )))
    }
}

/// Software token instance; holds the PIN while logged in
#[derive(Debug)]
pub struct SoftwareTokenModule {
    dir: PathBuf,
    kdf_rounds: u32,
    pin: Option<Pin>,
}

impl SoftwareTokenModule {
    pub fn new(dir: impl Into<PathBuf>, kdf_rounds: u32) -> Self {
        Self {
            dir: dir.into(),
            kdf_rounds,
            pin: None,
        }
    }

    fn marker_path(&self) -> PathBuf {
        self.dir.join(PIN_MARKER)
    }

    fn key_path(&self, key_id: &str) -> SignerResult<PathBuf> {
        let valid = !key_id.is_empty()
            && !key_id.starts_with('.')
            && key_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ModuleError::KeyNotFound {
                key_id: key_id.to_string(),
            }
            .into());
        }
        Ok(self.dir.join(format!("{key_id}.{KEY_EXTENSION}")))
    }

    fn logged_in_pin(&self) -> SignerResult<&Pin> {
        self.pin.as_ref().ok_or_else(|| {
            ModuleError::NotLoggedIn {
                token_id: SOFTWARE_TOKEN_ID.to_string(),
            }
            .into()
        })
    }

    fn read_sealed(&self, key_id: &str) -> SignerResult<SealedKey> {
        let path = self.key_path(key_id)?;
        match fs::read(&path) {
            Ok(bytes) => SealedKey::from_bytes(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ModuleError::KeyNotFound {
                key_id: key_id.to_string(),
            }
            .into()),
            Err(e) => Err(io_error(&path, e).into()),
        }
    }
}

impl PinVerifier for SoftwareTokenModule {
    fn initialize(&mut self, pin: &Pin) -> SignerResult<()> {
        let marker = self.marker_path();
        if marker.exists() {
            return Err(ModuleError::AlreadyInitialized {
                token_id: SOFTWARE_TOKEN_ID.to_string(),
            }
            .into());
        }

        let sealed = SealedKey::seal(PIN_MARKER_CONTENT, [0; 32], PIN_MARKER, pin, self.kdf_rounds)?;
        write_atomically(&marker, &sealed.to_bytes())?;
        info!("Initialized software token in {}", self.dir.display());
        Ok(())
    }

    fn unlock(&mut self, pin: &Pin) -> SignerResult<bool> {
        let marker = self.marker_path();
        let bytes = match fs::read(&marker) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ModuleError::NotInitialized {
                    token_id: SOFTWARE_TOKEN_ID.to_string(),
                }
                .into())
            }
            Err(e) => return Err(io_error(&marker, e).into()),
        };

        match SealedKey::from_bytes(&bytes)?.unseal(PIN_MARKER, pin) {
            Ok(_) => {
                self.pin = Some(pin.clone());
                debug!("Software token logged in");
                Ok(true)
            }
            Err(SignerError::Crypto(CryptoError::UnsealFailed { .. })) => {
                warn!("Software token PIN rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn lock(&mut self) -> SignerResult<()> {
        self.pin = None;
        Ok(())
    }

    fn is_unlocked(&self) -> bool {
        self.pin.is_some()
    }

    fn status(&self) -> TokenStatus {
        if self.marker_path().exists() {
            TokenStatus::Ok
        } else {
            TokenStatus::NotInitialized
        }
    }
}

impl KeyManager for SoftwareTokenModule {
    fn key_handles(&self) -> SignerResult<Vec<KeyHandle>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir, e).into()),
        };

        let mut handles = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(&self.dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(KEY_EXTENSION) {
                continue;
            }
            let Some(key_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match self.read_sealed(key_id) {
                Ok(sealed) => handles.push(KeyHandle {
                    key_id: key_id.to_string(),
                    label: None,
                    public_key: Some(sealed.public_key().to_vec()),
                    sign_mechanism: SignMechanism::EdDsa,
                }),
                Err(e) => warn!("Skipping unreadable key file {}: {e}", path.display()),
            }
        }
        handles.sort_by(|a, b| a.key_id.cmp(&b.key_id));
        Ok(handles)
    }

    fn generate_key(&mut self, config: &KeyConfig) -> SignerResult<KeyHandle> {
        let pin = self.logged_in_pin()?;
        if let Some(mechanism) = config.mechanism.filter(|m| *m != SignMechanism::EdDsa) {
            return Err(ModuleError::Unsupported {
                operation: format!("software key generation for {mechanism}"),
            }
            .into());
        }

        let mut secret = Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(secret.as_mut_slice());
        let signing_key = SigningKey::from_bytes(&secret);
        let public_key = signing_key.verifying_key().to_bytes();

        let key_id = random_id();
        let sealed = SealedKey::seal(&secret[..], public_key, &key_id, pin, self.kdf_rounds)?;
        write_atomically(&self.key_path(&key_id)?, &sealed.to_bytes())?;

        info!("Generated software key {key_id}");
        Ok(KeyHandle {
            key_id,
            label: config.label.clone(),
            public_key: Some(public_key.to_vec()),
            sign_mechanism: SignMechanism::EdDsa,
        })
    }

    fn delete_key(&mut self, key_id: &str) -> SignerResult<()> {
        self.logged_in_pin()?;
        let path = self.key_path(key_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted software key {key_id}");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ModuleError::KeyNotFound {
                key_id: key_id.to_string(),
            }
            .into()),
            Err(e) => Err(io_error(&path, e).into()),
        }
    }
}

impl Signer for SoftwareTokenModule {
    fn sign(
        &mut self,
        key_id: &str,
        mechanism: SignMechanism,
        digest: &[u8],
    ) -> SignerResult<Vec<u8>> {
        let pin = self.logged_in_pin()?;
        if mechanism != SignMechanism::EdDsa {
            return Err(ModuleError::Unsupported {
                operation: format!("software signing with {mechanism}"),
            }
            .into());
        }

        let secret = self.read_sealed(key_id)?.unseal(key_id, pin)?;
        let secret: &[u8; 32] = secret.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKeyFormat {
                format: format!("software key '{key_id}' has {} bytes", secret.len()),
            }
        })?;
        let signing_key = SigningKey::from_bytes(secret);

        debug!("Signing {} bytes with software key {key_id}", digest.len());
        Ok(signing_key.sign(digest).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract_tests_for;
    use crate::ports::contract_tests::module_contract;

    const ROUNDS: u32 = 10;

    fn initialized_module(dir: &Path) -> SoftwareTokenModule {
        let mut module = SoftwareTokenModule::new(dir, ROUNDS);
        module.initialize(&module_contract::pin()).unwrap();
        module
    }

    fn make_module() -> (tempfile::TempDir, SoftwareTokenModule) {
        let dir = tempfile::tempdir().unwrap();
        let module = initialized_module(dir.path());
        (dir, module)
    }

    contract_tests_for!(
        software_token_contract,
        make = make_module,
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
    fn test_finder_reports_uninitialized_token() {
        let dir = tempfile::tempdir().unwrap();
        let finder = SoftwareTokenFinder::new(dir.path(), ROUNDS);

        let slots = finder.list_available_slots().unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].id, SOFTWARE_TOKEN_ID);
        assert_eq!(slots[0].status, TokenStatus::NotInitialized);

        initialized_module(dir.path());
        let slots = finder.list_available_slots().unwrap();
        assert_eq!(slots[0].status, TokenStatus::Ok);
    }

    #[test]
    fn test_unlock_uninitialized_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut module = SoftwareTokenModule::new(dir.path(), ROUNDS);
        let err = module.unlock(&module_contract::pin()).unwrap_err();
        assert!(matches!(
            err,
            SignerError::Module(ModuleError::NotInitialized { .. })
        ));
        assert_eq!(module.status(), TokenStatus::NotInitialized);
    }

    #[test]
    fn test_initialize_twice_fails() {
        let (_dir, mut module) = make_module();
        let err = module.initialize(&module_contract::pin()).unwrap_err();
        assert!(matches!(
            err,
            SignerError::Module(ModuleError::AlreadyInitialized { .. })
        ));
    }

    #[test]
    fn test_keys_listed_while_locked_and_after_reopen() {
        let (dir, mut module) = make_module();
        module.unlock(&module_contract::pin()).unwrap();
        let handle = module.generate_key(&KeyConfig::default()).unwrap();

        let reopened = SoftwareTokenModule::new(dir.path(), ROUNDS);
        assert!(!reopened.is_unlocked());
        let handles = reopened.key_handles().unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].key_id, handle.key_id);
        assert_eq!(handles[0].public_key, handle.public_key);
    }

    #[test]
    fn test_rejects_non_eddsa_mechanism() {
        let (_dir, mut module) = make_module();
        module.unlock(&module_contract::pin()).unwrap();
        let handle = module.generate_key(&KeyConfig::default()).unwrap();

        let err = module
            .sign(&handle.key_id, SignMechanism::RsaPkcs, b"digest")
            .unwrap_err();
        assert!(matches!(
            err,
            SignerError::Module(ModuleError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_path_like_key_ids_are_rejected() {
        let (_dir, mut module) = make_module();
        module.unlock(&module_contract::pin()).unwrap();
        let err = module
            .sign("../etc/passwd", SignMechanism::EdDsa, b"digest")
            .unwrap_err();
        assert!(matches!(
            err,
            SignerError::Module(ModuleError::KeyNotFound { .. })
        ));
    }
}
