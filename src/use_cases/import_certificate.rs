//! Certificate import use case
//!
//! Attaches an issued certificate to the key whose public key it carries
//! and retires the request it answers.

use tracing::info;

use crate::error::{DomainError, RegistryError, SignerResult};
use crate::logic::inspect_certificate;
use crate::model::{Cert, CertStatus, ClientId, KeyUsage, NewCertificate};
use crate::registry::TokenRegistry;

/// How an imported certificate is registered
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub member_id: Option<ClientId>,
    /// Overrides the purpose read from the key usage extension
    pub usage: Option<KeyUsage>,
    pub active: bool,
    pub status: CertStatus,
}

/// Import a DER certificate
///
/// The certificate id is the SHA-256 hex of its content. The usage comes
/// from `options.usage`, else from the certificate's key usage extension,
/// else from the key. An answered certificate request is removed in the
/// same snapshot write as the import.
///
/// # Errors
///
/// Returns errors if:
/// - The DER does not parse as an X.509 certificate
/// - The certificate is already registered (`CertAlreadyExists`)
/// - No key holds the certificate's public key (`KeyForCertNotFound`)
/// - The usage disagrees with the key's (`WrongCertificateUsage`)
/// - A signing certificate has no member
/// - The snapshot cannot be written
pub fn import_certificate(
    registry: &TokenRegistry,
    der: &[u8],
    options: ImportOptions,
) -> SignerResult<Cert> {
    let info = inspect_certificate(der)?;

    if registry.get_certificate_by_hash(&info.hash).is_ok() {
        return Err(RegistryError::CertAlreadyExists { cert_id: info.hash }.into());
    }

    let key = registry
        .find_key_by_public_key(&info.public_key)
        .ok_or_else(|| RegistryError::KeyForCertNotFound {
            cert_hash: info.hash.clone(),
        })?;

    let usage = options
        .usage
        .or(info.usage)
        .or(key.usage)
        .unwrap_or(KeyUsage::Signing);
    if usage == KeyUsage::Signing && options.member_id.is_none() {
        return Err(DomainError::MemberRequired.into());
    }
    let member_id = match usage {
        KeyUsage::Signing => options.member_id,
        KeyUsage::Authentication => None,
    };

    let mut certificate = NewCertificate::new(der.to_vec())
        .active(options.active)
        .status(options.status)
        .saved(true)
        .usage(usage);
    if let Some(member_id) = &member_id {
        certificate = certificate.member(member_id.clone());
    }

    let cert = registry.batch(|state| {
        let cert = state.add_certificate(&key.id, certificate)?;
        let answered = state
            .cert_request_for(&key.id, member_id.as_ref())?
            .map(|request| request.id.clone());
        if let Some(request_id) = answered {
            state.remove_certificate_request(&request_id);
        }
        Ok(cert)
    })?;

    info!(
        "Imported {usage} certificate '{}' ({}) onto key '{}'",
        cert.id, info.subject, key.id
    );
    Ok(cert)
}

/// Remove a certificate from its key
///
/// # Errors
///
/// Returns `CertNotFound` for an unknown id, or a persistence error.
pub fn delete_certificate(registry: &TokenRegistry, cert_id: &str) -> SignerResult<()> {
    if !registry.remove_certificate(cert_id)? {
        return Err(RegistryError::CertNotFound {
            cert_id: cert_id.to_string(),
        }
        .into());
    }
    Ok(())
}
