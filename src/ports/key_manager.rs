//! KeyManager trait - capability to manage keys on a module

use crate::error::SignerResult;
use crate::model::SignMechanism;

/// Configuration for key generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyConfig {
    /// Label stored with the key on the module
    pub label: Option<String>,
    /// Mechanism to generate for; the module default when absent
    pub mechanism: Option<SignMechanism>,
}

/// What a module knows about one of its keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHandle {
    pub key_id: String,
    pub label: Option<String>,
    pub public_key: Option<Vec<u8>>,
    pub sign_mechanism: SignMechanism,
}

/// Capability to list, generate and delete keys
pub trait KeyManager {
    /// Keys physically present on the module
    fn key_handles(&self) -> SignerResult<Vec<KeyHandle>>;

    /// Generate a new key pair on the module
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// - The token is not logged in
    /// - The module cannot store more keys
    /// - Key generation fails
    fn generate_key(&mut self, config: &KeyConfig) -> SignerResult<KeyHandle>;

    fn delete_key(&mut self, key_id: &str) -> SignerResult<()>;
}
