//! Signer trait - capability to sign data

use crate::error::SignerResult;
use crate::model::SignMechanism;

/// Capability to sign with a key held by the module
pub trait Signer {
    /// Sign `digest` with the key `key_id`
    ///
    /// # Errors
    ///
    /// Returns errors if:
    /// - The token is not logged in
    /// - The key is not on the module
    /// - The mechanism does not fit the key
    /// - The device fails
    fn sign(&mut self, key_id: &str, mechanism: SignMechanism, digest: &[u8])
        -> SignerResult<Vec<u8>>;
}
