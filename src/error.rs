//! Error types for tokensign
//!
//! Errors are organized hierarchically and use thiserror for implementation.
//! Every error maps onto a coarse [`ErrorKind`] so an outer API layer can pick
//! the client-facing code without matching on individual variants.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::KeyUsage;

/// Result type alias for tokensign operations
pub type SignerResult<T> = Result<T, SignerError>;

/// Top-level error type for all tokensign operations
#[derive(Error, Debug)]
pub enum SignerError {
    /// Token/key/certificate registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Security module (hardware or software token) errors
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),

    /// Snapshot load/save errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Cryptographic operation errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// Domain validation errors
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Coarse classification of failures, stable across variant changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    UsageConflict,
    WrongCertificateUsage,
    ModuleUnavailable,
    PersistenceFailure,
    AccessDenied,
    InvalidInput,
    Crypto,
    Internal,
}

impl SignerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignerError::Registry(err) => err.kind(),
            SignerError::Module(err) => err.kind(),
            SignerError::Persistence(_) => ErrorKind::PersistenceFailure,
            SignerError::Crypto(CryptoError::InvalidCertificate { .. }) => ErrorKind::InvalidInput,
            SignerError::Crypto(_) => ErrorKind::Crypto,
            SignerError::Domain(_) => ErrorKind::InvalidInput,
            SignerError::Config(_) => ErrorKind::InvalidInput,
        }
    }
}

/// Registry lookup and validation errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Token '{token_id}' not found")]
    TokenNotFound { token_id: String },

    #[error("Key '{key_id}' not found")]
    KeyNotFound { key_id: String },

    #[error("Certificate '{cert_id}' not found")]
    CertNotFound { cert_id: String },

    #[error("Certificate with hash '{cert_hash}' not found")]
    CertWithHashNotFound { cert_hash: String },

    #[error("Certificate request '{request_id}' not found")]
    CertRequestNotFound { request_id: String },

    #[error("No key matching public key of certificate '{cert_hash}'")]
    KeyForCertNotFound { cert_hash: String },

    #[error("No signing key available for member '{member_id}'")]
    SigningKeyNotFound { member_id: String },

    #[error("Key '{key_id}' already exists")]
    KeyAlreadyExists { key_id: String },

    #[error("Certificate '{cert_id}' already exists")]
    CertAlreadyExists { cert_id: String },

    /// The key's usage is fixed and differs from the requested one
    #[error("Key '{key_id}' is a {current} key, cannot use it for {requested}")]
    UsageConflict {
        key_id: String,
        current: KeyUsage,
        requested: KeyUsage,
    },

    #[error("Cannot add {cert_usage} certificate to {key_usage} key '{key_id}'")]
    WrongCertificateUsage {
        key_id: String,
        key_usage: KeyUsage,
        cert_usage: KeyUsage,
    },

    #[error("Operation not allowed for transient certificate '{cert_id}'")]
    TransientCertificate { cert_id: String },

    #[error("Key '{key_id}' is not available")]
    KeyNotAvailable { key_id: String },

    #[error("Token '{token_id}' is not active")]
    TokenNotActive { token_id: String },
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::TokenNotFound { .. }
            | RegistryError::KeyNotFound { .. }
            | RegistryError::CertNotFound { .. }
            | RegistryError::CertWithHashNotFound { .. }
            | RegistryError::CertRequestNotFound { .. }
            | RegistryError::KeyForCertNotFound { .. }
            | RegistryError::SigningKeyNotFound { .. } => ErrorKind::NotFound,
            RegistryError::UsageConflict { .. } => ErrorKind::UsageConflict,
            RegistryError::WrongCertificateUsage { .. } => ErrorKind::WrongCertificateUsage,
            RegistryError::KeyAlreadyExists { .. }
            | RegistryError::CertAlreadyExists { .. }
            | RegistryError::TransientCertificate { .. } => ErrorKind::InvalidInput,
            RegistryError::KeyNotAvailable { .. } | RegistryError::TokenNotActive { .. } => {
                ErrorKind::AccessDenied
            }
        }
    }
}

/// Security module errors
#[derive(Error, Debug)]
pub enum ModuleError {
    /// No module instance is attached to the token
    #[error("Module for token '{token_id}' is not available")]
    Unavailable { token_id: String },

    #[error("Token '{token_id}' is not initialized")]
    NotInitialized { token_id: String },

    #[error("Token '{token_id}' is already initialized")]
    AlreadyInitialized { token_id: String },

    #[error("Incorrect PIN for token '{token_id}'")]
    PinIncorrect { token_id: String },

    #[error("Token '{token_id}' is not logged in")]
    NotLoggedIn { token_id: String },

    #[error("Key '{key_id}' not found on module")]
    KeyNotFound { key_id: String },

    #[error("Operation not supported by module: {operation}")]
    Unsupported { operation: String },

    /// Underlying device or driver failure
    #[error("Device error: {reason}")]
    Device { reason: String },
}

impl ModuleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModuleError::Unavailable { .. } | ModuleError::Device { .. } => {
                ErrorKind::ModuleUnavailable
            }
            ModuleError::NotInitialized { .. }
            | ModuleError::PinIncorrect { .. }
            | ModuleError::NotLoggedIn { .. } => ErrorKind::AccessDenied,
            ModuleError::KeyNotFound { .. } => ErrorKind::NotFound,
            ModuleError::AlreadyInitialized { .. } | ModuleError::Unsupported { .. } => {
                ErrorKind::InvalidInput
            }
        }
    }
}

/// Snapshot and key-file I/O errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid snapshot content: {reason}")]
    InvalidContent { reason: String },
}

/// Cryptographic operation errors
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid key format: {format}")]
    InvalidKeyFormat { format: String },

    #[error("Failed to seal key material: {reason}")]
    SealFailed { reason: String },

    #[error("Failed to unseal key material: {reason}")]
    UnsealFailed { reason: String },

    #[error("Invalid certificate: {reason}")]
    InvalidCertificate { reason: String },
}

/// Domain validation errors
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Client identifier error: {0}")]
    ClientId(#[from] crate::model::ClientIdError),

    #[error("PIN validation error: {0}")]
    Pin(#[from] crate::model::PinError),

    #[error("Sign mechanism error: {0}")]
    SignMechanism(#[from] crate::model::SignMechanismError),

    #[error("Key usage error: {0}")]
    KeyUsage(#[from] crate::model::KeyUsageError),

    #[error("Status error: {0}")]
    Status(#[from] crate::model::StatusError),

    #[error("A signing certificate request needs a member")]
    MemberRequired,
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

impl From<crate::model::ClientIdError> for SignerError {
    fn from(err: crate::model::ClientIdError) -> Self {
        SignerError::Domain(DomainError::ClientId(err))
    }
}

impl From<crate::model::PinError> for SignerError {
    fn from(err: crate::model::PinError) -> Self {
        SignerError::Domain(DomainError::Pin(err))
    }
}

impl From<crate::model::SignMechanismError> for SignerError {
    fn from(err: crate::model::SignMechanismError) -> Self {
        SignerError::Domain(DomainError::SignMechanism(err))
    }
}

impl From<crate::model::KeyUsageError> for SignerError {
    fn from(err: crate::model::KeyUsageError) -> Self {
        SignerError::Domain(DomainError::KeyUsage(err))
    }
}

impl From<crate::model::StatusError> for SignerError {
    fn from(err: crate::model::StatusError) -> Self {
        SignerError::Domain(DomainError::Status(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SignerError::Registry(RegistryError::KeyNotFound {
            key_id: "K1".to_string(),
        });
        assert!(err.to_string().contains("Key 'K1' not found"));
    }

    #[test]
    fn test_usage_conflict_kind_is_distinct() {
        let conflict = SignerError::Registry(RegistryError::UsageConflict {
            key_id: "K1".to_string(),
            current: KeyUsage::Signing,
            requested: KeyUsage::Authentication,
        });
        let wrong_usage = SignerError::Registry(RegistryError::WrongCertificateUsage {
            key_id: "K1".to_string(),
            key_usage: KeyUsage::Signing,
            cert_usage: KeyUsage::Authentication,
        });

        assert_eq!(conflict.kind(), ErrorKind::UsageConflict);
        assert_eq!(wrong_usage.kind(), ErrorKind::WrongCertificateUsage);
        assert!(conflict.to_string().contains("AUTHENTICATION"));
    }

    #[test]
    fn test_module_and_persistence_kinds() {
        let unavailable = SignerError::Module(ModuleError::Unavailable {
            token_id: "0".to_string(),
        });
        assert_eq!(unavailable.kind(), ErrorKind::ModuleUnavailable);

        let io = SignerError::Persistence(PersistenceError::Io {
            path: PathBuf::from("/nonexistent"),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(io.kind(), ErrorKind::PersistenceFailure);
        assert!(io.to_string().contains("disk full"));
    }

    #[test]
    fn test_pin_error_conversion() {
        let err: SignerError = crate::model::PinError::TooShort.into();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("PIN"));
    }
}
