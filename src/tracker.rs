//! OCSP and renewal bookkeeping on certificates
//!
//! An external scheduler fetches OCSP responses and renews certificates;
//! this tracker records the outcomes on the registry and answers which
//! certificates need attention next.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::error::SignerResult;
use crate::model::{Cert, OcspResponse};
use crate::registry::{RegistryState, TokenRegistry};

#[derive(Clone)]
pub struct StatusTracker {
    registry: Arc<TokenRegistry>,
}

fn tracked_certs(state: &RegistryState) -> impl Iterator<Item = &Cert> {
    state
        .certs()
        .filter(|cert| cert.active && cert.saved_to_configuration)
}

impl StatusTracker {
    pub fn new(registry: Arc<TokenRegistry>) -> Self {
        Self { registry }
    }

    /// Cache an OCSP response; runtime state, not written to the snapshot
    pub fn record_ocsp_response(
        &self,
        cert_hash: &str,
        der: Vec<u8>,
        fetched_at: DateTime<Utc>,
    ) -> SignerResult<()> {
        self.registry
            .set_ocsp_response(cert_hash, OcspResponse { der, fetched_at })
    }

    pub fn ocsp_response(&self, cert_hash: &str) -> SignerResult<Option<OcspResponse>> {
        self.registry
            .read(|state| Ok(state.cert_by_hash(cert_hash)?.ocsp_response.clone()))
    }

    /// Active saved certificates without an OCSP response younger than `max_age`
    pub fn certificates_with_stale_ocsp(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<Cert> {
        self.registry.read(|state| {
            tracked_certs(state)
                .filter(|cert| {
                    // A freshness window past the representable range never expires
                    !cert.ocsp_response.as_ref().is_some_and(|response| {
                        response
                            .fetched_at
                            .checked_add_signed(max_age)
                            .map_or(true, |fresh_until| fresh_until >= now)
                    })
                })
                .cloned()
                .collect()
        })
    }

    /// Active saved certificates whose planned renewal time has come
    pub fn certificates_due_for_renewal(&self, now: DateTime<Utc>) -> Vec<Cert> {
        self.registry.read(|state| {
            tracked_certs(state)
                .filter(|cert| {
                    cert.renewal
                        .as_ref()
                        .and_then(|renewal| renewal.next_renewal_time)
                        .is_some_and(|at| at <= now)
                })
                .cloned()
                .collect()
        })
    }

    pub fn schedule_renewal(&self, cert_id: &str, at: DateTime<Utc>) -> SignerResult<()> {
        self.registry.set_next_planned_renewal(cert_id, Some(at))
    }

    /// A newer certificate was issued and waits to replace `cert_id`
    pub fn record_renewal_success(&self, cert_id: &str, renewed_cert_hash: &str) -> SignerResult<()> {
        self.registry.batch(|state| {
            state.set_renewed_cert_hash(cert_id, Some(renewed_cert_hash.to_string()))?;
            state.set_renewal_error(cert_id, None)?;
            state.set_next_planned_renewal(cert_id, None)
        })?;
        info!("Certificate {cert_id} renewed by {renewed_cert_hash}");
        Ok(())
    }

    pub fn record_renewal_failure(
        &self,
        cert_id: &str,
        error: &str,
        next_attempt: Option<DateTime<Utc>>,
    ) -> SignerResult<()> {
        self.registry.batch(|state| {
            state.set_renewal_error(cert_id, Some(error.to_string()))?;
            state.set_next_planned_renewal(cert_id, next_attempt)
        })?;
        warn!("Renewal of certificate {cert_id} failed: {error}");
        Ok(())
    }
}
