//! Durable snapshot document and its mapping to the registry model
//!
//! The document keeps only what survives a restart. Runtime fields
//! (availability, login state, OCSP responses) are rebuilt by discovery.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cert_hash;
use super::random_id;
use crate::error::{PersistenceError, SignerError, SignerResult};
use crate::model::{
    Cert, CertRequest, CertStatus, ClientId, Key, KeyUsage, RenewalState, SignMechanism, Token,
    TokenStatus, SOFTWARE_MODULE_TYPE,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEntry {
    #[serde(rename = "type")]
    pub device_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub pin_index: u32,
    #[serde(default)]
    pub batch_signing_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_mechanism: Option<SignMechanism>,
    #[serde(default)]
    pub keys: Vec<KeyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntry {
    pub key_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<KeyUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_mechanism: Option<SignMechanism>,
    #[serde(default)]
    pub certs: Vec<CertEntry>,
    #[serde(default)]
    pub cert_requests: Vec<CertRequestEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub status: CertStatus,
    /// Base64 DER
    pub contents: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewed_cert_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_renewal_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocsp_verify_before_activation_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertRequestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    pub subject_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_alt_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_profile: Option<String>,
}

/// Build the document for `tokens`
///
/// Only keys holding a saved certificate or a request are written, and
/// tokens left without keys are dropped. Transient certificates never are.
pub fn to_document(tokens: &[Token]) -> SnapshotDocument {
    let devices = tokens
        .iter()
        .filter_map(|token| {
            let keys: Vec<KeyEntry> = token
                .keys
                .iter()
                .filter(|key| key.has_persistent_content())
                .map(key_entry)
                .collect();
            (!keys.is_empty()).then(|| DeviceEntry {
                device_type: token.module_type.clone(),
                id: token.id.clone(),
                friendly_name: token.friendly_name.clone(),
                serial_number: token.serial_number.clone(),
                label: token.label.clone(),
                pin_index: token.slot_index,
                batch_signing_enabled: token.batch_signing_enabled,
                sign_mechanism: Some(token.sign_mechanism),
                keys,
            })
        })
        .collect();

    SnapshotDocument { devices }
}

fn key_entry(key: &Key) -> KeyEntry {
    KeyEntry {
        key_id: key.id.clone(),
        usage: key.usage,
        friendly_name: key.friendly_name.clone(),
        label: key.label.clone(),
        public_key: key.public_key.as_ref().map(|bytes| BASE64.encode(bytes)),
        sign_mechanism: Some(key.sign_mechanism),
        certs: key
            .certs
            .iter()
            .filter(|cert| cert.saved_to_configuration)
            .map(cert_entry)
            .collect(),
        cert_requests: key.cert_requests.iter().map(cert_request_entry).collect(),
    }
}

fn cert_entry(cert: &Cert) -> CertEntry {
    let renewal = cert.renewal.clone().unwrap_or_default();
    CertEntry {
        id: Some(cert.id.clone()),
        member_id: cert.member_id.as_ref().map(ToString::to_string),
        active: cert.active,
        status: cert.status,
        contents: BASE64.encode(&cert.der),
        renewed_cert_hash: renewal.renewed_cert_hash,
        renewal_error: renewal.renewal_error,
        next_renewal_time: renewal.next_renewal_time,
        ocsp_verify_before_activation_error: cert.ocsp_verify_before_activation_error.clone(),
        activated_at: cert.activated_at,
    }
}

fn cert_request_entry(request: &CertRequest) -> CertRequestEntry {
    CertRequestEntry {
        id: Some(request.id.clone()),
        member_id: request.member_id.as_ref().map(ToString::to_string),
        subject_name: request.subject_name.clone(),
        subject_alt_name: request.subject_alt_name.clone(),
        certificate_profile: request.certificate_profile.clone(),
    }
}

/// Rebuild tokens from a document
///
/// Loaded tokens and keys start unavailable and inactive until discovery
/// sees their module. Software tokens always come back with batch signing
/// enabled, whatever the document says.
pub fn from_document(document: SnapshotDocument) -> SignerResult<Vec<Token>> {
    document.devices.into_iter().map(token_from_entry).collect()
}

fn token_from_entry(device: DeviceEntry) -> SignerResult<Token> {
    let is_software = device.device_type == SOFTWARE_MODULE_TYPE;
    let token_mechanism = device.sign_mechanism.unwrap_or_else(|| {
        if is_software {
            SignMechanism::EdDsa
        } else {
            SignMechanism::module_default()
        }
    });

    let keys = device
        .keys
        .into_iter()
        .map(|entry| key_from_entry(entry, &device.id, token_mechanism))
        .collect::<SignerResult<Vec<_>>>()?;

    Ok(Token {
        id: device.id,
        friendly_name: device.friendly_name,
        serial_number: device.serial_number,
        label: device.label,
        slot_index: device.pin_index,
        read_only: false,
        batch_signing_enabled: is_software || device.batch_signing_enabled,
        sign_mechanism: token_mechanism,
        available: false,
        active: false,
        status: TokenStatus::Ok,
        module_type: device.device_type,
        keys,
    })
}

fn key_from_entry(
    entry: KeyEntry,
    token_id: &str,
    token_mechanism: SignMechanism,
) -> SignerResult<Key> {
    let public_key = entry
        .public_key
        .map(|encoded| decode_base64(&encoded, "public key"))
        .transpose()?;

    let certs = entry
        .certs
        .into_iter()
        .map(|cert| cert_from_entry(cert, &entry.key_id))
        .collect::<SignerResult<Vec<_>>>()?;

    let cert_requests = entry
        .cert_requests
        .into_iter()
        .map(|request| cert_request_from_entry(request, &entry.key_id))
        .collect::<SignerResult<Vec<_>>>()?;

    Ok(Key {
        token_id: token_id.to_string(),
        friendly_name: entry.friendly_name,
        label: entry.label,
        usage: entry.usage,
        public_key,
        sign_mechanism: entry.sign_mechanism.unwrap_or(token_mechanism),
        available: false,
        certs,
        cert_requests,
        id: entry.key_id,
    })
}

fn cert_from_entry(entry: CertEntry, key_id: &str) -> SignerResult<Cert> {
    let der = decode_base64(&entry.contents, "certificate contents")?;
    let hash = cert_hash(&der);
    let renewal = RenewalState {
        renewed_cert_hash: entry.renewed_cert_hash,
        renewal_error: entry.renewal_error,
        next_renewal_time: entry.next_renewal_time,
    };

    Ok(Cert {
        id: entry.id.unwrap_or_else(|| hash.clone()),
        key_id: key_id.to_string(),
        member_id: parse_member(entry.member_id)?,
        active: entry.active,
        status: entry.status,
        saved_to_configuration: true,
        der,
        hash,
        ocsp_response: None,
        ocsp_verify_before_activation_error: entry.ocsp_verify_before_activation_error,
        renewal: (!renewal.is_empty()).then_some(renewal),
        activated_at: entry.activated_at,
    })
}

fn cert_request_from_entry(entry: CertRequestEntry, key_id: &str) -> SignerResult<CertRequest> {
    Ok(CertRequest {
        id: entry.id.unwrap_or_else(random_id),
        key_id: key_id.to_string(),
        member_id: parse_member(entry.member_id)?,
        subject_name: entry.subject_name,
        subject_alt_name: entry.subject_alt_name,
        certificate_profile: entry.certificate_profile,
    })
}

fn parse_member(value: Option<String>) -> SignerResult<Option<ClientId>> {
    value
        .map(|member| {
            member.parse::<ClientId>().map_err(|e| {
                SignerError::from(PersistenceError::InvalidContent {
                    reason: format!("member id: {e}"),
                })
            })
        })
        .transpose()
}

fn decode_base64(value: &str, what: &str) -> SignerResult<Vec<u8>> {
    BASE64.decode(value).map_err(|e| {
        SignerError::from(PersistenceError::InvalidContent {
            reason: format!("{what}: {e}"),
        })
    })
}
