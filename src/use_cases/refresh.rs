//! Discovery reconciliation use case
//!
//! Brings the registry in line with what the modules report: slots become
//! tokens, key handles become keys, and anything that vanished is marked
//! unavailable (or dropped when nothing worth keeping hangs off it).

use tracing::{debug, warn};

use crate::error::SignerResult;
use crate::model::TokenDescriptor;
use crate::modules::ModuleManager;
use crate::ports::KeyHandle;
use crate::registry::TokenRegistry;

/// Reconcile the registry with every module
///
/// # Errors
///
/// Returns the first registry or persistence error. A module that cannot
/// list its keys is logged and skipped.
pub fn refresh(registry: &TokenRegistry, modules: &ModuleManager) -> SignerResult<()> {
    let descriptors = modules.discover();

    for descriptor in &descriptors {
        registry.create_token(descriptor);
    }
    mark_vanished_tokens(registry, &descriptors)?;

    for descriptor in &descriptors {
        let snapshot = modules.with_module(&descriptor.id, |module| {
            Ok((module.key_handles()?, module.is_unlocked(), module.status()))
        });
        let (handles, unlocked, status) = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Cannot read keys of token '{}': {e}", descriptor.id);
                continue;
            }
        };

        registry.set_token_active(&descriptor.id, unlocked)?;
        registry.set_token_status(&descriptor.id, status)?;
        reconcile_keys(registry, &descriptor.id, &handles)?;
    }
    Ok(())
}

fn mark_vanished_tokens(registry: &TokenRegistry, descriptors: &[TokenDescriptor]) -> SignerResult<()> {
    let vanished: Vec<String> = registry.read(|state| {
        state
            .tokens()
            .iter()
            .filter(|token| token.available && !descriptors.iter().any(|d| d.identifies(token)))
            .map(|token| token.id.clone())
            .collect()
    });

    for token_id in vanished {
        warn!("Token '{token_id}' is no longer available");
        registry.set_token_available(&token_id, false)?;
        registry.set_token_active(&token_id, false)?;
        let key_ids = registry.list_keys(&token_id)?.into_iter().map(|key| key.id);
        for key_id in key_ids {
            registry.set_key_available(&key_id, false)?;
        }
    }
    Ok(())
}

/// Planned changes for one token, computed under a single read
#[derive(Default)]
struct KeyPlan {
    add: Vec<KeyHandle>,
    fill_public_key: Vec<(String, Vec<u8>)>,
    fill_label: Vec<(String, String)>,
    present: Vec<String>,
    missing: Vec<String>,
    remove: Vec<String>,
}

fn plan_keys(registry: &TokenRegistry, token_id: &str, handles: &[KeyHandle]) -> SignerResult<KeyPlan> {
    registry.read(|state| {
        let mut plan = KeyPlan::default();
        for handle in handles {
            let Ok(key) = state.key(&handle.key_id) else {
                plan.add.push(handle.clone());
                continue;
            };
            plan.present.push(key.id.clone());
            if let (None, Some(public_key)) = (&key.public_key, &handle.public_key) {
                plan.fill_public_key.push((key.id.clone(), public_key.clone()));
            }
            if let (None, Some(label)) = (&key.label, &handle.label) {
                plan.fill_label.push((key.id.clone(), label.clone()));
            }
        }

        for key in &state.token(token_id)?.keys {
            if handles.iter().any(|handle| handle.key_id == key.id) {
                continue;
            }
            if key.has_persistent_content() {
                plan.missing.push(key.id.clone());
            } else {
                plan.remove.push(key.id.clone());
            }
        }
        Ok(plan)
    })
}

fn reconcile_keys(registry: &TokenRegistry, token_id: &str, handles: &[KeyHandle]) -> SignerResult<()> {
    let plan = plan_keys(registry, token_id, handles)?;

    for handle in &plan.add {
        registry.add_key(token_id, &handle.key_id, handle.public_key.clone())?;
        if let Some(label) = &handle.label {
            registry.set_key_label(&handle.key_id, label)?;
        }
    }
    for (key_id, public_key) in plan.fill_public_key {
        registry.set_public_key(&key_id, public_key)?;
    }
    for (key_id, label) in plan.fill_label {
        registry.set_key_label(&key_id, &label)?;
    }
    for key_id in &plan.present {
        registry.set_key_available(key_id, true)?;
    }
    for key_id in &plan.missing {
        debug!("Key '{key_id}' is not on its module");
        registry.set_key_available(key_id, false)?;
    }
    for key_id in &plan.remove {
        registry.remove_key(key_id)?;
    }
    Ok(())
}
