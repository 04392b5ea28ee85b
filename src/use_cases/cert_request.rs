//! Certificate request use case

use tracing::{info, warn};

use crate::error::{DomainError, RegistryError, SignerResult};
use crate::model::{CertRequestOutcome, KeyUsage, NewCertRequest};
use crate::registry::TokenRegistry;

/// Register a pending enrollment for `key_id`
///
/// Fixes the key's usage on first use. An equivalent request already on
/// the key is reported as [`CertRequestOutcome::Existing`].
///
/// # Errors
///
/// Returns errors if:
/// - The key is unknown
/// - The key's usage is fixed to a different purpose (`UsageConflict`)
/// - A signing request names no member
/// - The snapshot cannot be written
pub fn request_certificate(
    registry: &TokenRegistry,
    key_id: &str,
    usage: KeyUsage,
    request: NewCertRequest,
) -> SignerResult<CertRequestOutcome> {
    if usage == KeyUsage::Signing && request.member_id.is_none() {
        return Err(DomainError::MemberRequired.into());
    }

    let outcome = registry.add_certificate_request(key_id, usage, request)?;
    match &outcome {
        CertRequestOutcome::Created(id) => info!("Certificate request '{id}' created on key '{key_id}'"),
        CertRequestOutcome::Existing(id) => warn!("Reusing certificate request '{id}' on key '{key_id}'"),
    }
    Ok(outcome)
}

/// Drop a pending request
///
/// # Errors
///
/// Returns `CertRequestNotFound` when no key holds `request_id`.
pub fn delete_cert_request(registry: &TokenRegistry, request_id: &str) -> SignerResult<String> {
    registry
        .remove_certificate_request(request_id)?
        .ok_or_else(|| {
            RegistryError::CertRequestNotFound {
                request_id: request_id.to_string(),
            }
            .into()
        })
}
