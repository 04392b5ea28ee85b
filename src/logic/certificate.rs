//! X.509 inspection needed to attach imported certificates to keys

use chrono::{DateTime, Utc};
use x509_cert::der::oid::AssociatedOid;
use x509_cert::der::Decode;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
use x509_cert::Certificate;

use super::cert_hash;
use crate::error::{CryptoError, SignerResult};
use crate::model::KeyUsage;

/// Facts about a DER certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub hash: String,
    /// RFC 4514 subject name
    pub subject: String,
    /// Raw subject public key bits
    pub public_key: Vec<u8>,
    pub not_after: DateTime<Utc>,
    /// Purpose derived from the key usage extension, if present
    pub usage: Option<KeyUsage>,
}

pub fn inspect_certificate(der: &[u8]) -> SignerResult<CertificateInfo> {
    let cert = Certificate::from_der(der).map_err(|e| CryptoError::InvalidCertificate {
        reason: e.to_string(),
    })?;
    let tbs = &cert.tbs_certificate;

    let not_after_secs = tbs.validity.not_after.to_unix_duration().as_secs();
    let not_after = i64::try_from(not_after_secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(|| CryptoError::InvalidCertificate {
            reason: format!("validity end out of range: {not_after_secs}"),
        })?;

    Ok(CertificateInfo {
        hash: cert_hash(der),
        subject: tbs.subject.to_string(),
        public_key: tbs
            .subject_public_key_info
            .subject_public_key
            .raw_bytes()
            .to_vec(),
        not_after,
        usage: usage_from_extensions(&cert)?,
    })
}

/// Non-repudiation marks a signing certificate; digital signature alone
/// marks an authentication certificate.
fn usage_from_extensions(cert: &Certificate) -> SignerResult<Option<KeyUsage>> {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return Ok(None);
    };

    for extension in extensions {
        if extension.extn_id != X509KeyUsage::OID {
            continue;
        }
        let key_usage = X509KeyUsage::from_der(extension.extn_value.as_bytes()).map_err(|e| {
            CryptoError::InvalidCertificate {
                reason: format!("malformed key usage extension: {e}"),
            }
        })?;
        if key_usage.non_repudiation() {
            return Ok(Some(KeyUsage::Signing));
        }
        if key_usage.digital_signature() {
            return Ok(Some(KeyUsage::Authentication));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGN_CERT: &[u8] = include_bytes!("../../tests/fixtures/sign-cert.der");
    const SIGN_PUB: &[u8] = include_bytes!("../../tests/fixtures/sign-pub.bin");
    const AUTH_CERT: &[u8] = include_bytes!("../../tests/fixtures/auth-cert.der");

    #[test]
    fn test_inspect_signing_certificate() {
        let info = inspect_certificate(SIGN_CERT).unwrap();
        assert_eq!(
            info.hash,
            "2d63c1c745d7ad6d46b99d3eb58e6a2cdb2f0780f36907e930c99d8eef710815"
        );
        assert_eq!(info.public_key, SIGN_PUB);
        assert_eq!(info.usage, Some(KeyUsage::Signing));
        assert!(info.subject.contains("CN=1234-sign"));
        assert!(info.not_after > Utc::now());
    }

    #[test]
    fn test_inspect_authentication_certificate() {
        let info = inspect_certificate(AUTH_CERT).unwrap();
        assert_eq!(info.usage, Some(KeyUsage::Authentication));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = inspect_certificate(b"not a certificate").unwrap_err();
        assert!(matches!(
            err,
            crate::SignerError::Crypto(CryptoError::InvalidCertificate { .. })
        ));
    }
}
