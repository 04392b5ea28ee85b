//! Certificates bound to keys and their runtime status

use chrono::{DateTime, Utc};

use super::{CertStatus, ClientId, KeyUsage};
use crate::logic::cert_hash;

/// X.509 certificate attached to a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cert {
    pub id: String,
    pub key_id: String,
    pub member_id: Option<ClientId>,
    pub active: bool,
    pub status: CertStatus,
    /// Transient certificates are never written to the snapshot
    pub saved_to_configuration: bool,
    pub der: Vec<u8>,
    /// Lowercase hex SHA-256 of `der`
    pub hash: String,
    pub ocsp_response: Option<OcspResponse>,
    pub ocsp_verify_before_activation_error: Option<String>,
    pub renewal: Option<RenewalState>,
    pub activated_at: Option<DateTime<Utc>>,
}

impl Cert {
    pub fn is_transient(&self) -> bool {
        !self.saved_to_configuration
    }

    /// Active and bound to a member
    pub fn is_valid_for_signing(&self) -> bool {
        self.active && self.member_id.is_some()
    }
}

/// Automatic renewal bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewalState {
    /// Hash of the newer certificate waiting to replace this one
    pub renewed_cert_hash: Option<String>,
    pub renewal_error: Option<String>,
    pub next_renewal_time: Option<DateTime<Utc>>,
}

impl RenewalState {
    pub fn is_empty(&self) -> bool {
        self.renewed_cert_hash.is_none()
            && self.renewal_error.is_none()
            && self.next_renewal_time.is_none()
    }
}

/// Cached OCSP response for a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspResponse {
    pub der: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

/// Parameters for attaching a certificate to a key
#[derive(Debug, Clone)]
pub struct NewCertificate {
    pub der: Vec<u8>,
    pub id: Option<String>,
    pub member_id: Option<ClientId>,
    pub active: bool,
    pub status: CertStatus,
    pub saved_to_configuration: bool,
    /// Purpose the certificate was issued for, checked against the key
    pub usage: Option<KeyUsage>,
}

impl NewCertificate {
    pub fn new(der: Vec<u8>) -> Self {
        Self {
            der,
            id: None,
            member_id: None,
            active: false,
            status: CertStatus::Saved,
            saved_to_configuration: false,
            usage: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn member(mut self, member_id: ClientId) -> Self {
        self.member_id = Some(member_id);
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn status(mut self, status: CertStatus) -> Self {
        self.status = status;
        self
    }

    pub fn saved(mut self, saved: bool) -> Self {
        self.saved_to_configuration = saved;
        self
    }

    pub fn usage(mut self, usage: KeyUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub(crate) fn into_cert(self, key_id: &str) -> Cert {
        let hash = cert_hash(&self.der);
        Cert {
            id: self.id.unwrap_or_else(|| hash.clone()),
            key_id: key_id.to_string(),
            member_id: self.member_id,
            active: self.active,
            status: self.status,
            saved_to_configuration: self.saved_to_configuration,
            activated_at: self.active.then(Utc::now),
            der: self.der,
            hash,
            ocsp_response: None,
            ocsp_verify_before_activation_error: None,
            renewal: None,
        }
    }
}
