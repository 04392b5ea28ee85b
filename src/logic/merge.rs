//! Merge a freshly loaded snapshot onto the in-memory registry
//!
//! The file wins for everything it persists. Memory keeps what only the
//! running process knows: availability, login state, token status and
//! cached OCSP responses.

use crate::model::{Cert, Key, Token};

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub tokens: Vec<Token>,
    /// Certificates present in the file but not in memory
    pub added_certs: Vec<Cert>,
}

pub fn merge_onto_file_tokens(file_tokens: Vec<Token>, memory_tokens: &[Token]) -> MergeOutcome {
    let mut added_certs = Vec::new();

    let mut tokens: Vec<Token> = file_tokens
        .into_iter()
        .map(|mut file_token| {
            match memory_tokens.iter().find(|t| t.id == file_token.id) {
                Some(memory_token) => merge_token(&mut file_token, memory_token, &mut added_certs),
                None => added_certs.extend(
                    file_token
                        .keys
                        .iter()
                        .flat_map(|key| key.certs.iter().cloned()),
                ),
            }
            file_token
        })
        .collect();

    for memory_token in memory_tokens {
        if !tokens.iter().any(|t| t.id == memory_token.id) {
            tokens.push(memory_token.clone());
        }
    }

    MergeOutcome {
        tokens,
        added_certs,
    }
}

fn merge_token(file_token: &mut Token, memory_token: &Token, added_certs: &mut Vec<Cert>) {
    file_token.read_only = memory_token.read_only;
    file_token.available = memory_token.available;
    file_token.active = memory_token.active;
    file_token.status = memory_token.status;

    for file_key in &mut file_token.keys {
        match memory_token.key(&file_key.id) {
            Some(memory_key) => merge_key(file_key, memory_key, added_certs),
            None => added_certs.extend(file_key.certs.iter().cloned()),
        }
    }

    // Module-reported keys never reach the file; keep them.
    for memory_key in &memory_token.keys {
        if file_token.key(&memory_key.id).is_none() && !memory_key.has_persistent_content() {
            file_token.keys.push(memory_key.clone());
        }
    }
}

fn merge_key(file_key: &mut Key, memory_key: &Key, added_certs: &mut Vec<Cert>) {
    file_key.available = memory_key.available;
    if file_key.public_key.is_none() {
        file_key.public_key = memory_key.public_key.clone();
    }

    for cert in &mut file_key.certs {
        match memory_key.cert(&cert.id) {
            Some(memory_cert) => {
                cert.ocsp_response = memory_cert.ocsp_response.clone();
                cert.activated_at = cert.activated_at.or(memory_cert.activated_at);
            }
            None => added_certs.push(cert.clone()),
        }
    }

    for transient in memory_key.certs.iter().filter(|cert| cert.is_transient()) {
        if file_key.cert(&transient.id).is_none() {
            file_key.certs.push(transient.clone());
        }
    }
}
