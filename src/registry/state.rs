//! Token hierarchy and every rule that governs it
//!
//! `RegistryState` is plain data: tokens own keys, keys own certificates
//! and requests. Lookups are iterator chains over the owned vectors. All
//! locking lives one level up in [`super::TokenRegistry`].

use chrono::{DateTime, Utc};
use tracing::{info, trace, warn};

use crate::error::{RegistryError, SignerResult};
use crate::logic::random_id;
use crate::model::{
    Cert, CertRequest, CertRequestOutcome, CertStatus, ClientId, Key, KeyUsage, NewCertRequest,
    NewCertificate, OcspResponse, RenewalState, Token, TokenDescriptor, TokenStatus,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryState {
    tokens: Vec<Token>,
}

impl RegistryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.tokens.iter().flat_map(|token| token.keys.iter())
    }

    pub fn certs(&self) -> impl Iterator<Item = &Cert> {
        self.keys().flat_map(|key| key.certs.iter())
    }

    pub fn cert_requests(&self) -> impl Iterator<Item = &CertRequest> {
        self.keys().flat_map(|key| key.cert_requests.iter())
    }

    // Lookups

    pub fn token(&self, token_id: &str) -> SignerResult<&Token> {
        self.tokens
            .iter()
            .find(|token| token.id == token_id)
            .ok_or_else(|| token_not_found(token_id))
    }

    fn token_mut(&mut self, token_id: &str) -> SignerResult<&mut Token> {
        self.tokens
            .iter_mut()
            .find(|token| token.id == token_id)
            .ok_or_else(|| token_not_found(token_id))
    }

    pub fn key(&self, key_id: &str) -> SignerResult<&Key> {
        self.keys()
            .find(|key| key.id == key_id)
            .ok_or_else(|| key_not_found(key_id))
    }

    fn key_mut(&mut self, key_id: &str) -> SignerResult<&mut Key> {
        self.tokens
            .iter_mut()
            .flat_map(|token| token.keys.iter_mut())
            .find(|key| key.id == key_id)
            .ok_or_else(|| key_not_found(key_id))
    }

    pub fn token_for_key(&self, key_id: &str) -> SignerResult<&Token> {
        self.tokens
            .iter()
            .find(|token| token.key(key_id).is_some())
            .ok_or_else(|| key_not_found(key_id))
    }

    pub fn cert(&self, cert_id: &str) -> SignerResult<&Cert> {
        self.certs()
            .find(|cert| cert.id == cert_id)
            .ok_or_else(|| cert_not_found(cert_id))
    }

    fn cert_mut(&mut self, cert_id: &str) -> SignerResult<&mut Cert> {
        self.certs_mut()
            .find(|cert| cert.id == cert_id)
            .ok_or_else(|| cert_not_found(cert_id))
    }

    pub fn cert_by_hash(&self, cert_hash: &str) -> SignerResult<&Cert> {
        self.certs()
            .find(|cert| cert.hash.eq_ignore_ascii_case(cert_hash))
            .ok_or_else(|| {
                RegistryError::CertWithHashNotFound {
                    cert_hash: cert_hash.to_string(),
                }
                .into()
            })
    }

    fn cert_by_hash_mut(&mut self, cert_hash: &str) -> SignerResult<&mut Cert> {
        self.certs_mut()
            .find(|cert| cert.hash.eq_ignore_ascii_case(cert_hash))
            .ok_or_else(|| {
                RegistryError::CertWithHashNotFound {
                    cert_hash: cert_hash.to_string(),
                }
                .into()
            })
    }

    fn certs_mut(&mut self) -> impl Iterator<Item = &mut Cert> {
        self.tokens
            .iter_mut()
            .flat_map(|token| token.keys.iter_mut())
            .flat_map(|key| key.certs.iter_mut())
    }

    pub fn cert_request(&self, request_id: &str) -> SignerResult<&CertRequest> {
        self.cert_requests()
            .find(|request| request.id == request_id)
            .ok_or_else(|| {
                RegistryError::CertRequestNotFound {
                    request_id: request_id.to_string(),
                }
                .into()
            })
    }

    pub fn key_for_cert_request(&self, request_id: &str) -> SignerResult<&Key> {
        let request = self.cert_request(request_id)?;
        self.key(&request.key_id)
    }

    pub fn key_by_public_key(&self, public_key: &[u8]) -> Option<&Key> {
        self.keys()
            .find(|key| key.public_key.as_deref() == Some(public_key))
    }

    /// Certificates bound to `member_id`, or to the member owning it
    pub fn certificates_for_member(&self, member_id: &ClientId) -> Vec<Cert> {
        self.certs()
            .filter(|cert| {
                cert.member_id.as_ref().is_some_and(|bound| {
                    bound == member_id || member_id.subsystem_contains_member(bound)
                })
            })
            .cloned()
            .collect()
    }

    /// Request on `key_id` that a certificate for `member_id` answers
    ///
    /// Authentication keys hold a single request, so any request matches.
    pub fn cert_request_for(
        &self,
        key_id: &str,
        member_id: Option<&ClientId>,
    ) -> SignerResult<Option<&CertRequest>> {
        let key = self.key(key_id)?;
        let request = if key.usage == Some(KeyUsage::Authentication) {
            key.cert_requests.first()
        } else {
            key.cert_requests
                .iter()
                .find(|request| request.member_id.as_ref() == member_id)
        };
        Ok(request)
    }

    // Tokens

    /// Register a discovered module slot
    ///
    /// A slot seen before is marked available again and picks up the
    /// reported status instead of being duplicated.
    pub fn create_token(&mut self, descriptor: &TokenDescriptor) -> Token {
        trace!("create_token({})", descriptor.id);

        if let Some(token) = self
            .tokens
            .iter_mut()
            .find(|token| descriptor.identifies(token))
        {
            token.available = true;
            token.read_only = descriptor.read_only;
            token.status = descriptor.status;
            return token.clone();
        }

        let token = Token::from_descriptor(descriptor);
        info!("Created token '{}' ({})", token.id, token.module_type);
        self.tokens.push(token.clone());
        token
    }

    pub fn set_token_available(&mut self, token_id: &str, available: bool) -> SignerResult<()> {
        trace!("set_token_available({token_id}, {available})");
        self.token_mut(token_id)?.available = available;
        Ok(())
    }

    pub fn set_token_active(&mut self, token_id: &str, active: bool) -> SignerResult<()> {
        trace!("set_token_active({token_id}, {active})");
        self.token_mut(token_id)?.active = active;
        Ok(())
    }

    pub fn set_token_status(&mut self, token_id: &str, status: TokenStatus) -> SignerResult<()> {
        trace!("set_token_status({token_id}, {status:?})");
        self.token_mut(token_id)?.status = status;
        Ok(())
    }

    pub fn set_token_friendly_name(
        &mut self,
        token_id: &str,
        friendly_name: &str,
    ) -> SignerResult<()> {
        trace!("set_token_friendly_name({token_id}, {friendly_name})");
        self.token_mut(token_id)?.friendly_name = Some(friendly_name.to_string());
        Ok(())
    }

    // Keys

    pub fn add_key(
        &mut self,
        token_id: &str,
        key_id: &str,
        public_key: Option<Vec<u8>>,
    ) -> SignerResult<Key> {
        trace!("add_key({token_id}, {key_id})");

        if self.key(key_id).is_ok() {
            return Err(RegistryError::KeyAlreadyExists {
                key_id: key_id.to_string(),
            }
            .into());
        }

        let token = self.token_mut(token_id)?;
        let mut key = Key::new(key_id, token_id, token.sign_mechanism);
        key.public_key = public_key;
        token.keys.push(key.clone());
        info!("Added key '{key_id}' to token '{token_id}'");
        Ok(key)
    }

    pub fn remove_key(&mut self, key_id: &str) -> bool {
        trace!("remove_key({key_id})");
        for token in &mut self.tokens {
            if let Some(position) = token.keys.iter().position(|key| key.id == key_id) {
                token.keys.remove(position);
                info!("Removed key '{key_id}' from token '{}'", token.id);
                return true;
            }
        }
        false
    }

    pub fn set_key_available(&mut self, key_id: &str, available: bool) -> SignerResult<()> {
        trace!("set_key_available({key_id}, {available})");
        self.key_mut(key_id)?.available = available;
        Ok(())
    }

    pub fn set_key_friendly_name(&mut self, key_id: &str, friendly_name: &str) -> SignerResult<()> {
        trace!("set_key_friendly_name({key_id}, {friendly_name})");
        self.key_mut(key_id)?.friendly_name = Some(friendly_name.to_string());
        Ok(())
    }

    pub fn set_key_label(&mut self, key_id: &str, label: &str) -> SignerResult<()> {
        trace!("set_key_label({key_id}, {label})");
        self.key_mut(key_id)?.label = Some(label.to_string());
        Ok(())
    }

    pub fn set_public_key(&mut self, key_id: &str, public_key: Vec<u8>) -> SignerResult<()> {
        trace!("set_public_key({key_id})");
        self.key_mut(key_id)?.public_key = Some(public_key);
        Ok(())
    }

    /// Fix the purpose of `key_id`; setting the same purpose again is a no-op
    pub fn set_key_usage(&mut self, key_id: &str, usage: KeyUsage) -> SignerResult<()> {
        trace!("set_key_usage({key_id}, {usage})");
        let key = self.key_mut(key_id)?;
        bind_usage(key, usage)
    }

    // Certificates

    pub fn add_certificate(
        &mut self,
        key_id: &str,
        certificate: NewCertificate,
    ) -> SignerResult<Cert> {
        trace!("add_certificate({key_id})");

        let cert_usage = certificate.usage;
        let cert = certificate.into_cert(key_id);
        if self.certs().any(|existing| existing.id == cert.id) {
            return Err(RegistryError::CertAlreadyExists { cert_id: cert.id }.into());
        }

        let key = self.key_mut(key_id)?;
        if let Some(cert_usage) = cert_usage {
            match key.usage {
                Some(key_usage) if key_usage != cert_usage => {
                    return Err(RegistryError::WrongCertificateUsage {
                        key_id: key_id.to_string(),
                        key_usage,
                        cert_usage,
                    }
                    .into());
                }
                _ => key.usage = Some(cert_usage),
            }
        }

        key.certs.push(cert.clone());
        info!("Added certificate '{}' to key '{key_id}'", cert.id);
        Ok(cert)
    }

    pub fn remove_certificate(&mut self, cert_id: &str) -> bool {
        trace!("remove_certificate({cert_id})");
        for key in self.tokens.iter_mut().flat_map(|token| token.keys.iter_mut()) {
            if let Some(position) = key.certs.iter().position(|cert| cert.id == cert_id) {
                key.certs.remove(position);
                info!("Removed certificate '{cert_id}' from key '{}'", key.id);
                return true;
            }
        }
        false
    }

    pub fn set_certificate_active(&mut self, cert_id: &str, active: bool) -> SignerResult<()> {
        trace!("set_certificate_active({cert_id}, {active})");
        let cert = self.cert_mut(cert_id)?;
        if active && !cert.active {
            cert.activated_at = Some(Utc::now());
        }
        cert.active = active;
        Ok(())
    }

    pub fn set_certificate_status(&mut self, cert_id: &str, status: CertStatus) -> SignerResult<()> {
        trace!("set_certificate_status({cert_id}, {status})");
        self.cert_mut(cert_id)?.status = status;
        Ok(())
    }

    pub fn set_ocsp_verify_before_activation_error(
        &mut self,
        cert_id: &str,
        error: Option<String>,
    ) -> SignerResult<()> {
        trace!("set_ocsp_verify_before_activation_error({cert_id})");
        let cert = persistent_cert(self.cert_mut(cert_id)?)?;
        cert.ocsp_verify_before_activation_error = error;
        Ok(())
    }

    // OCSP and renewal

    pub fn set_ocsp_response(&mut self, cert_hash: &str, response: OcspResponse) -> SignerResult<()> {
        trace!("set_ocsp_response({cert_hash})");
        let cert = persistent_cert(self.cert_by_hash_mut(cert_hash)?)?;
        cert.ocsp_response = Some(response);
        Ok(())
    }

    pub fn set_renewed_cert_hash(&mut self, cert_id: &str, hash: Option<String>) -> SignerResult<()> {
        trace!("set_renewed_cert_hash({cert_id})");
        self.update_renewal(cert_id, |renewal| renewal.renewed_cert_hash = hash)
    }

    pub fn set_renewal_error(&mut self, cert_id: &str, error: Option<String>) -> SignerResult<()> {
        trace!("set_renewal_error({cert_id})");
        self.update_renewal(cert_id, |renewal| renewal.renewal_error = error)
    }

    pub fn set_next_planned_renewal(
        &mut self,
        cert_id: &str,
        next_renewal_time: Option<DateTime<Utc>>,
    ) -> SignerResult<()> {
        trace!("set_next_planned_renewal({cert_id}, {next_renewal_time:?})");
        self.update_renewal(cert_id, |renewal| {
            renewal.next_renewal_time = next_renewal_time
        })
    }

    fn update_renewal(
        &mut self,
        cert_id: &str,
        update: impl FnOnce(&mut RenewalState),
    ) -> SignerResult<()> {
        let cert = persistent_cert(self.cert_mut(cert_id)?)?;
        let mut renewal = cert.renewal.take().unwrap_or_default();
        update(&mut renewal);
        cert.renewal = (!renewal.is_empty()).then_some(renewal);
        Ok(())
    }

    // Certificate requests

    /// Register a pending enrollment on `key_id`
    ///
    /// A request equal to an existing one (same member, subject compared
    /// case-insensitively) returns the existing id. An authentication key
    /// keeps a single request, so a new one replaces the old.
    pub fn add_certificate_request(
        &mut self,
        key_id: &str,
        usage: KeyUsage,
        request: NewCertRequest,
    ) -> SignerResult<CertRequestOutcome> {
        trace!("add_certificate_request({key_id}, {usage})");

        let key = self.key_mut(key_id)?;
        if let Some(current) = key.usage {
            if current != usage {
                return Err(RegistryError::UsageConflict {
                    key_id: key_id.to_string(),
                    current,
                    requested: usage,
                }
                .into());
            }
        }

        if let Some(existing) = key
            .cert_requests
            .iter()
            .find(|existing| existing.matches(request.member_id.as_ref(), &request.subject_name))
        {
            warn!(
                "Certificate request for subject '{}' already exists on key '{key_id}'",
                request.subject_name
            );
            return Ok(CertRequestOutcome::Existing(existing.id.clone()));
        }

        key.usage = Some(usage);
        if usage == KeyUsage::Authentication && !key.cert_requests.is_empty() {
            info!("Replacing certificate request on authentication key '{key_id}'");
            key.cert_requests.clear();
        }

        let id = random_id();
        key.cert_requests.push(CertRequest {
            id: id.clone(),
            key_id: key_id.to_string(),
            member_id: request.member_id,
            subject_name: request.subject_name,
            subject_alt_name: request.subject_alt_name,
            certificate_profile: request.certificate_profile,
        });
        info!("Added certificate request '{id}' to key '{key_id}'");
        Ok(CertRequestOutcome::Created(id))
    }

    /// Remove a request, returning the id of the key that held it
    pub fn remove_certificate_request(&mut self, request_id: &str) -> Option<String> {
        trace!("remove_certificate_request({request_id})");
        for key in self.tokens.iter_mut().flat_map(|token| token.keys.iter_mut()) {
            if let Some(position) = key
                .cert_requests
                .iter()
                .position(|request| request.id == request_id)
            {
                key.cert_requests.remove(position);
                info!("Removed certificate request '{request_id}' from key '{}'", key.id);
                return Some(key.id.clone());
            }
        }
        None
    }

    /// Replace the whole hierarchy, as after a merge with the snapshot file
    pub(crate) fn replace_tokens(&mut self, tokens: Vec<Token>) {
        self.tokens = tokens;
    }
}

fn bind_usage(key: &mut Key, usage: KeyUsage) -> SignerResult<()> {
    match key.usage {
        Some(current) if current != usage => Err(RegistryError::UsageConflict {
            key_id: key.id.clone(),
            current,
            requested: usage,
        }
        .into()),
        _ => {
            key.usage = Some(usage);
            Ok(())
        }
    }
}

fn persistent_cert(cert: &mut Cert) -> SignerResult<&mut Cert> {
    if cert.is_transient() {
        return Err(RegistryError::TransientCertificate {
            cert_id: cert.id.clone(),
        }
        .into());
    }
    Ok(cert)
}

fn token_not_found(token_id: &str) -> crate::SignerError {
    RegistryError::TokenNotFound {
        token_id: token_id.to_string(),
    }
    .into()
}

fn key_not_found(key_id: &str) -> crate::SignerError {
    RegistryError::KeyNotFound {
        key_id: key_id.to_string(),
    }
    .into()
}

fn cert_not_found(cert_id: &str) -> crate::SignerError {
    RegistryError::CertNotFound {
        cert_id: cert_id.to_string(),
    }
    .into()
}
