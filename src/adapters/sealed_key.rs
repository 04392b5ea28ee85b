//! Sealed key file format (PBKDF2-HMAC-SHA256 + ChaCha20-Poly1305)
//!
//! Layout: `MAGIC | version | rounds (u32 LE) | salt | nonce | public key | ciphertext+tag`.
//! Everything before the ciphertext, followed by the key id, is the
//! associated data, so a file cannot be renamed onto another key id.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{CryptoError, SignerResult};
use crate::model::Pin;

const MAGIC: [u8; 4] = *b"TSK1";
const VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
pub(crate) const PUBLIC_KEY_LEN: usize = 32;
const HEADER_LEN: usize = 4 + 1 + 4 + SALT_LEN + NONCE_LEN + PUBLIC_KEY_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SealedKey {
    rounds: u32,
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    public_key: [u8; PUBLIC_KEY_LEN],
    ciphertext: Vec<u8>,
}

impl SealedKey {
    pub(crate) fn seal(
        secret: &[u8],
        public_key: [u8; PUBLIC_KEY_LEN],
        key_id: &str,
        pin: &Pin,
        rounds: u32,
    ) -> SignerResult<Self> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        let mut rng = rand::rng();
        rng.fill_bytes(&mut salt);
        rng.fill_bytes(&mut nonce);

        let mut sealed = Self {
            rounds,
            salt,
            nonce,
            public_key,
            ciphertext: Vec::new(),
        };
        let key = derive_key(pin, &salt, rounds);
        let aad = sealed.aad(key_id);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        sealed.ciphertext = cipher
            .encrypt(
                &nonce.into(),
                Payload {
                    msg: secret,
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::SealFailed {
                reason: e.to_string(),
            })?;
        Ok(sealed)
    }

    /// Decrypt the secret; a wrong PIN shows up as an authentication failure
    pub(crate) fn unseal(&self, key_id: &str, pin: &Pin) -> SignerResult<Zeroizing<Vec<u8>>> {
        let key = derive_key(pin, &self.salt, self.rounds);
        let aad = self.aad(key_id);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let secret = cipher
            .decrypt(
                &self.nonce.into(),
                Payload {
                    msg: &self.ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| CryptoError::UnsealFailed {
                reason: format!("authentication failed for '{key_id}'"),
            })?;
        Ok(Zeroizing::new(secret))
    }

    pub(crate) fn public_key(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.public_key
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.header();
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    pub(crate) fn from_bytes(data: &[u8]) -> SignerResult<Self> {
        if data.len() <= HEADER_LEN {
            return Err(invalid("file too short"));
        }
        if data[0..4] != MAGIC {
            return Err(invalid("bad magic bytes"));
        }
        if data[4] != VERSION {
            return Err(invalid(&format!("unsupported version {}", data[4])));
        }

        let salt_start = 9;
        let nonce_start = salt_start + SALT_LEN;
        let public_key_start = nonce_start + NONCE_LEN;
        let rounds = u32::from_le_bytes(data[5..9].try_into().map_err(|_| invalid("rounds"))?);
        let salt = data[salt_start..nonce_start]
            .try_into()
            .map_err(|_| invalid("salt"))?;
        let nonce = data[nonce_start..public_key_start]
            .try_into()
            .map_err(|_| invalid("nonce"))?;
        let public_key = data[public_key_start..HEADER_LEN]
            .try_into()
            .map_err(|_| invalid("public key"))?;

        Ok(Self {
            rounds,
            salt,
            nonce,
            public_key,
            ciphertext: data[HEADER_LEN..].to_vec(),
        })
    }

    fn header(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&self.rounds.to_le_bytes());
        buf.extend_from_slice(&self.salt);
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.public_key);
        buf
    }

    fn aad(&self, key_id: &str) -> Vec<u8> {
        let mut aad = self.header();
        aad.extend_from_slice(key_id.as_bytes());
        aad
    }
}

fn derive_key(pin: &Pin, salt: &[u8], rounds: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2_hmac::<Sha256>(pin.as_bytes(), salt, rounds, &mut key[..]);
    key
}

fn invalid(format: &str) -> crate::SignerError {
    CryptoError::InvalidKeyFormat {
        format: format!("sealed key: {format}"),
    }
    .into()
}
