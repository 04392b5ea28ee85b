//! Token login, logout and software token initialization

use tracing::{info, warn};

use crate::error::{ModuleError, SignerResult};
use crate::model::{Pin, TokenStatus};
use crate::modules::ModuleManager;
use crate::registry::TokenRegistry;

/// Log in to a token with its PIN
///
/// On success the token becomes active and its status `Ok`. A wrong PIN
/// leaves the token inactive with the status the module reports, or
/// `UserPinIncorrect` when the module reports nothing more specific.
///
/// # Errors
///
/// Returns errors if:
/// - The token is unknown or has no module
/// - The PIN is wrong (`PinIncorrect`)
/// - The module fails
pub fn activate_token(
    registry: &TokenRegistry,
    modules: &ModuleManager,
    token_id: &str,
    pin: &Pin,
) -> SignerResult<()> {
    registry.get_token(token_id)?;

    let (unlocked, status) = modules.with_module(token_id, |module| {
        let unlocked = module.unlock(pin)?;
        Ok((unlocked, module.status()))
    })?;

    if !unlocked {
        let status = if status.is_pin_failure() {
            status
        } else {
            TokenStatus::UserPinIncorrect
        };
        warn!("Login to token '{token_id}' failed: {status:?}");
        registry.set_token_status(token_id, status)?;
        registry.set_token_active(token_id, false)?;
        return Err(ModuleError::PinIncorrect {
            token_id: token_id.to_string(),
        }
        .into());
    }

    registry.set_token_status(token_id, TokenStatus::Ok)?;
    registry.set_token_active(token_id, true)?;
    info!("Token '{token_id}' activated");
    Ok(())
}

/// Log out of a token
///
/// # Errors
///
/// Returns errors if the token is unknown or the module fails to lock.
pub fn deactivate_token(
    registry: &TokenRegistry,
    modules: &ModuleManager,
    token_id: &str,
) -> SignerResult<()> {
    registry.get_token(token_id)?;
    if modules.has_module(token_id) {
        modules.with_module(token_id, |module| module.lock())?;
    }
    registry.set_token_active(token_id, false)?;
    info!("Token '{token_id}' deactivated");
    Ok(())
}

/// Set the PIN of an uninitialized token
///
/// # Errors
///
/// Returns errors if:
/// - The token has no module
/// - The token is already initialized
/// - The module cannot store the PIN
pub fn initialize_token(
    registry: &TokenRegistry,
    modules: &ModuleManager,
    token_id: &str,
    pin: &Pin,
) -> SignerResult<()> {
    modules.with_module(token_id, |module| module.initialize(pin))?;
    if registry.get_token(token_id).is_ok() {
        registry.set_token_status(token_id, TokenStatus::Ok)?;
    }
    info!("Token '{token_id}' initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapters::fake_module::FakeModuleFinder;
    use crate::error::ErrorKind;
    use crate::use_cases::refresh;

    fn setup() -> (TokenRegistry, ModuleManager) {
        let finder = FakeModuleFinder::new();
        finder.plug("T1");
        let modules = ModuleManager::new(vec![Arc::new(finder)]);
        let registry = TokenRegistry::in_memory();
        refresh(&registry, &modules).unwrap();
        (registry, modules)
    }

    #[test]
    fn test_activate_with_correct_pin() {
        let (registry, modules) = setup();
        activate_token(&registry, &modules, "T1", &Pin::from_str("1234").unwrap()).unwrap();

        let token = registry.get_token("T1").unwrap();
        assert!(token.active);
        assert_eq!(token.status, TokenStatus::Ok);
    }

    #[test]
    fn test_wrong_pin_marks_status() {
        let (registry, modules) = setup();
        let err = activate_token(&registry, &modules, "T1", &Pin::from_str("0000").unwrap())
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        let token = registry.get_token("T1").unwrap();
        assert!(!token.active);
        assert_eq!(token.status, TokenStatus::UserPinIncorrect);
    }

    #[test]
    fn test_deactivate_locks_module() {
        let (registry, modules) = setup();
        activate_token(&registry, &modules, "T1", &Pin::from_str("1234").unwrap()).unwrap();
        deactivate_token(&registry, &modules, "T1").unwrap();

        assert!(!registry.get_token("T1").unwrap().active);
        assert!(!modules.with_module("T1", |m| Ok(m.is_unlocked())).unwrap());
    }

    #[test]
    fn test_unknown_token() {
        let (registry, modules) = setup();
        let err = activate_token(&registry, &modules, "T9", &Pin::from_str("1234").unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
