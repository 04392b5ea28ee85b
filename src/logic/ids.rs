use rand::{rng, RngCore};
use sha2::{Digest, Sha256};

const RANDOM_ID_BYTES: usize = 20;

/// Random identifier for keys, transient certificates and requests
pub fn random_id() -> String {
    let mut bytes = [0u8; RANDOM_ID_BYTES];
    rng().fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

/// Lowercase hex SHA-256 of a DER certificate
pub fn cert_hash(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_id_shape() {
        let id = random_id();
        assert_eq!(id.len(), RANDOM_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_id());
    }

    #[test]
    fn test_cert_hash_is_sha256_hex() {
        assert_eq!(
            cert_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
