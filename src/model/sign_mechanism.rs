//! Signing mechanisms supported by security modules

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signing mechanism a key is used with
///
/// Names follow the PKCS#11 mechanism identifiers used by hardware modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignMechanism {
    /// RSA PKCS#1 v1.5
    #[serde(rename = "CKM_RSA_PKCS")]
    RsaPkcs,
    /// RSA PSS
    #[serde(rename = "CKM_RSA_PKCS_PSS")]
    RsaPkcsPss,
    /// ECDSA over a pre-computed digest
    #[serde(rename = "CKM_ECDSA")]
    Ecdsa,
    /// Ed25519
    #[serde(rename = "CKM_EDDSA")]
    EdDsa,
}

impl SignMechanism {
    /// Mechanism assumed when neither the key nor its token names one
    pub fn module_default() -> Self {
        Self::RsaPkcs
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignMechanism::RsaPkcs => "CKM_RSA_PKCS",
            SignMechanism::RsaPkcsPss => "CKM_RSA_PKCS_PSS",
            SignMechanism::Ecdsa => "CKM_ECDSA",
            SignMechanism::EdDsa => "CKM_EDDSA",
        }
    }
}

impl fmt::Display for SignMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignMechanism {
    type Err = SignMechanismError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CKM_RSA_PKCS" => Ok(SignMechanism::RsaPkcs),
            "CKM_RSA_PKCS_PSS" => Ok(SignMechanism::RsaPkcsPss),
            "CKM_ECDSA" => Ok(SignMechanism::Ecdsa),
            "CKM_EDDSA" => Ok(SignMechanism::EdDsa),
            _ => Err(SignMechanismError::Unsupported {
                mechanism: s.to_string(),
            }),
        }
    }
}

/// Errors that can occur when working with sign mechanisms
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignMechanismError {
    #[error("Sign mechanism not supported: {mechanism}")]
    Unsupported { mechanism: String },
}
