//! Signing authorization: which key may sign for a member right now
//!
//! Pure functions over a [`RegistryState`]; callers hold the registry lock
//! (through [`TokenRegistry::read`](crate::registry::TokenRegistry::read))
//! for the duration of one query, so the answer reflects a single
//! consistent state.

use serde::{Deserialize, Serialize};

use crate::model::{Cert, ClientId, Key, SignMechanism, Token};
use crate::registry::RegistryState;

/// Tie-break when several certificates authorize the same member
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// Registry order: token, then key, then certificate insertion order
    #[default]
    FirstMatch,
    /// Latest `activated_at` wins; certificates never activated sort last
    MostRecentlyActivated,
}

/// A key and certificate pair eligible to sign for a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningCandidate {
    pub token_id: String,
    pub key_id: String,
    pub sign_mechanism: SignMechanism,
    pub batch_signing_enabled: bool,
    pub cert: Cert,
}

/// A certificate bound to `member` authorizes `member` and all of its subsystems
pub fn cert_belongs_to_member(cert: &Cert, member: &ClientId) -> bool {
    cert.member_id
        .as_ref()
        .is_some_and(|bound| bound == member || member.subsystem_contains_member(bound))
}

fn eligible_certs<'a>(
    token: &'a Token,
    key: &'a Key,
    member: &'a ClientId,
) -> impl Iterator<Item = &'a Cert> + 'a {
    let usable = token.is_usable() && key.is_valid_for_signing();
    key.certs
        .iter()
        .filter(move |cert| usable && cert.is_valid_for_signing())
        .filter(move |cert| cert_belongs_to_member(cert, member))
}

/// Every pair that may sign for `member`, in registry order
pub fn signing_candidates(state: &RegistryState, member: &ClientId) -> Vec<SigningCandidate> {
    state
        .tokens()
        .iter()
        .flat_map(|token| token.keys.iter().map(move |key| (token, key)))
        .flat_map(|(token, key)| {
            eligible_certs(token, key, member).map(move |cert| SigningCandidate {
                token_id: token.id.clone(),
                key_id: key.id.clone(),
                sign_mechanism: key.sign_mechanism,
                batch_signing_enabled: token.batch_signing_enabled,
                cert: cert.clone(),
            })
        })
        .collect()
}

/// Pick one candidate according to `policy`
pub fn select(candidates: Vec<SigningCandidate>, policy: SelectionPolicy) -> Option<SigningCandidate> {
    match policy {
        SelectionPolicy::FirstMatch => candidates.into_iter().next(),
        SelectionPolicy::MostRecentlyActivated => candidates
            .into_iter()
            .enumerate()
            // Ties keep the earliest candidate
            .max_by(|(ia, a), (ib, b)| {
                a.cert
                    .activated_at
                    .cmp(&b.cert.activated_at)
                    .then(ib.cmp(ia))
            })
            .map(|(_, candidate)| candidate),
    }
}

/// The single pair to sign with for `member`
pub fn find_signing_candidate(
    state: &RegistryState,
    member: &ClientId,
    policy: SelectionPolicy,
) -> Option<SigningCandidate> {
    select(signing_candidates(state, member), policy)
}

/// Whether `key_id` may sign for `member` right now
pub fn can_sign_for(state: &RegistryState, key_id: &str, member: &ClientId) -> bool {
    let Ok(key) = state.key(key_id) else {
        return false;
    };
    let Ok(token) = state.token(&key.token_id) else {
        return false;
    };
    eligible_certs(token, key, member).next().is_some()
}
