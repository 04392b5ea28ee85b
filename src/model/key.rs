use super::{Cert, CertRequest, KeyUsage, SignMechanism};

/// Asymmetric key pair held by exactly one token
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub id: String,
    /// Identifier of the owning token; not an ownership edge
    pub token_id: String,
    pub friendly_name: Option<String>,
    pub label: Option<String>,
    /// Fixed by the first certificate or certificate request
    pub usage: Option<KeyUsage>,
    pub public_key: Option<Vec<u8>>,
    pub sign_mechanism: SignMechanism,
    pub available: bool,
    pub certs: Vec<Cert>,
    pub cert_requests: Vec<CertRequest>,
}

impl Key {
    pub fn new(
        id: impl Into<String>,
        token_id: impl Into<String>,
        sign_mechanism: SignMechanism,
    ) -> Self {
        Self {
            id: id.into(),
            token_id: token_id.into(),
            friendly_name: None,
            label: None,
            usage: None,
            public_key: None,
            sign_mechanism,
            available: true,
            certs: Vec::new(),
            cert_requests: Vec::new(),
        }
    }

    /// Available and not an authentication key
    pub fn is_valid_for_signing(&self) -> bool {
        self.available && self.usage != Some(KeyUsage::Authentication)
    }

    /// Holds something the snapshot keeps: a saved certificate or a request
    pub fn has_persistent_content(&self) -> bool {
        self.certs.iter().any(|cert| cert.saved_to_configuration) || !self.cert_requests.is_empty()
    }

    pub fn cert(&self, cert_id: &str) -> Option<&Cert> {
        self.certs.iter().find(|cert| cert.id == cert_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewCertificate;

    #[test]
    fn test_authentication_key_is_not_valid_for_signing() {
        let mut key = Key::new("K1", "0", SignMechanism::EdDsa);
        assert!(key.is_valid_for_signing());

        key.usage = Some(KeyUsage::Authentication);
        assert!(!key.is_valid_for_signing());

        key.usage = Some(KeyUsage::Signing);
        key.available = false;
        assert!(!key.is_valid_for_signing());
    }

    #[test]
    fn test_persistent_content_ignores_transient_certs() {
        let mut key = Key::new("K1", "0", SignMechanism::EdDsa);
        assert!(!key.has_persistent_content());

        key.certs
            .push(NewCertificate::new(vec![1, 2, 3]).into_cert("K1"));
        assert!(!key.has_persistent_content());

        key.certs
            .push(NewCertificate::new(vec![4, 5, 6]).saved(true).into_cert("K1"));
        assert!(key.has_persistent_content());
    }
}
