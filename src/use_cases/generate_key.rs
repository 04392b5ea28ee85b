//! Generate key use case
//!
//! Creates a key pair on the token's module and registers it, so the key
//! can receive certificate requests and certificates right away.

use tracing::info;

use crate::error::{RegistryError, SignerResult};
use crate::model::Key;
use crate::modules::ModuleManager;
use crate::ports::KeyConfig;
use crate::registry::TokenRegistry;

/// Generate a key pair on `token_id`
///
/// The generated key takes the token's sign mechanism unless `config`
/// names one. `config.label` also becomes the key's friendly name.
///
/// # Returns
///
/// The registered key, carrying the public key the module reported
///
/// # Errors
///
/// Returns errors if:
/// - The token is unknown, unavailable or not logged in
/// - The module cannot generate the requested mechanism
/// - The snapshot cannot be written
pub fn generate_key(
    registry: &TokenRegistry,
    modules: &ModuleManager,
    token_id: &str,
    config: &KeyConfig,
) -> SignerResult<Key> {
    let token = registry.get_token(token_id)?;
    if !token.active {
        return Err(RegistryError::TokenNotActive {
            token_id: token_id.to_string(),
        }
        .into());
    }

    let config = KeyConfig {
        mechanism: config.mechanism.or(Some(token.sign_mechanism)),
        ..config.clone()
    };
    let handle = modules.with_module(token_id, |module| module.generate_key(&config))?;

    registry.add_key(token_id, &handle.key_id, handle.public_key.clone())?;
    if let Some(label) = &handle.label {
        registry.set_key_label(&handle.key_id, label)?;
        registry.set_key_friendly_name(&handle.key_id, label)?;
    }
    info!("Generated key '{}' on token '{token_id}'", handle.key_id);
    registry.get_key(&handle.key_id)
}
