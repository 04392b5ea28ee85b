//! Delete key use case

use tracing::{info, warn};

use crate::error::{ModuleError, RegistryError, SignerError, SignerResult};
use crate::modules::ModuleManager;
use crate::registry::TokenRegistry;

/// Remove `key_id` from the registry, and from its module when `from_module` is set
///
/// Without `from_module` only the registry entry and everything hanging off
/// it (certificates and requests) goes away. A key still present on its
/// module reappears, bare, on the next refresh.
///
/// # Errors
///
/// Returns errors if:
/// - The key is unknown
/// - `from_module` is set and the token is unavailable or not logged in
/// - The module refuses the deletion
/// - The snapshot cannot be written
pub fn delete_key(
    registry: &TokenRegistry,
    modules: &ModuleManager,
    key_id: &str,
    from_module: bool,
) -> SignerResult<()> {
    let token = registry.get_token_for_key(key_id)?;

    if from_module {
        if !token.available {
            return Err(ModuleError::Unavailable { token_id: token.id }.into());
        }
        if !token.active {
            return Err(RegistryError::TokenNotActive { token_id: token.id }.into());
        }
        match modules.with_module(&token.id, |module| module.delete_key(key_id)) {
            Ok(()) => info!("Deleted key '{key_id}' from token '{}'", token.id),
            // Already gone from the device, drop the stale entry anyway
            Err(SignerError::Module(ModuleError::KeyNotFound { .. })) => {
                warn!("Key '{key_id}' was not on token '{}'", token.id);
            }
            Err(e) => return Err(e),
        }
    }

    registry.remove_key(key_id)?;
    Ok(())
}
