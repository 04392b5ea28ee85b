//! Signing use cases
//!
//! The registry lock is held only while choosing the key; the module call
//! happens after it is released, under the module's own lock.

use tracing::debug;

use crate::authorization::{find_signing_candidate, SelectionPolicy};
use crate::error::{ModuleError, RegistryError, SignerResult};
use crate::model::{ClientId, SignMechanism};
use crate::modules::ModuleManager;
use crate::registry::{RegistryState, TokenRegistry};

/// A signature and the credential that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSignature {
    pub key_id: String,
    pub cert_id: String,
    pub sign_mechanism: SignMechanism,
    pub signature: Vec<u8>,
}

struct SigningTarget {
    token_id: String,
    sign_mechanism: SignMechanism,
}

fn signing_target(state: &RegistryState, key_id: &str) -> SignerResult<SigningTarget> {
    let token = state.token_for_key(key_id)?;
    let key = state.key(key_id)?;
    if !token.available {
        return Err(ModuleError::Unavailable {
            token_id: token.id.clone(),
        }
        .into());
    }
    if !token.active {
        return Err(RegistryError::TokenNotActive {
            token_id: token.id.clone(),
        }
        .into());
    }
    if !key.available {
        return Err(RegistryError::KeyNotAvailable {
            key_id: key_id.to_string(),
        }
        .into());
    }
    Ok(SigningTarget {
        token_id: token.id.clone(),
        sign_mechanism: key.sign_mechanism,
    })
}

/// Sign `digest` with `key_id`
///
/// # Errors
///
/// Returns errors if:
/// - The key is unknown
/// - Its token is unavailable (`ModuleUnavailable`) or not logged in
/// - The key is unavailable
/// - The module fails to sign
pub fn sign_with_key(
    registry: &TokenRegistry,
    modules: &ModuleManager,
    key_id: &str,
    digest: &[u8],
) -> SignerResult<Vec<u8>> {
    let target = registry.read(|state| signing_target(state, key_id))?;
    debug!("Signing {} byte(s) with key '{key_id}'", digest.len());
    modules.with_module(&target.token_id, |module| {
        module.sign(key_id, target.sign_mechanism, digest)
    })
}

/// Sign `digest` on behalf of `member` with the key its certificates authorize
///
/// # Errors
///
/// Returns `SigningKeyNotFound` when no usable key holds an active
/// certificate for `member`, or the module's error when signing fails.
pub fn sign_for_member(
    registry: &TokenRegistry,
    modules: &ModuleManager,
    member: &ClientId,
    policy: SelectionPolicy,
    digest: &[u8],
) -> SignerResult<MemberSignature> {
    let candidate = registry
        .read(|state| find_signing_candidate(state, member, policy))
        .ok_or_else(|| RegistryError::SigningKeyNotFound {
            member_id: member.to_string(),
        })?;

    debug!(
        "Signing for '{member}' with key '{}' (certificate '{}')",
        candidate.key_id, candidate.cert.id
    );
    let signature = modules.with_module(&candidate.token_id, |module| {
        module.sign(&candidate.key_id, candidate.sign_mechanism, digest)
    })?;

    Ok(MemberSignature {
        key_id: candidate.key_id,
        cert_id: candidate.cert.id,
        sign_mechanism: candidate.sign_mechanism,
        signature,
    })
}
