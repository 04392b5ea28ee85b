use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Login state reported by a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    #[default]
    Ok,
    NotInitialized,
    UserPinIncorrect,
    UserPinInvalid,
    UserPinExpired,
    UserPinCountLow,
    UserPinFinalTry,
    UserPinLocked,
}

impl TokenStatus {
    pub fn is_pin_failure(self) -> bool {
        matches!(
            self,
            TokenStatus::UserPinIncorrect
                | TokenStatus::UserPinInvalid
                | TokenStatus::UserPinExpired
                | TokenStatus::UserPinFinalTry
                | TokenStatus::UserPinLocked
        )
    }
}

/// Registration state of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CertStatus {
    #[default]
    #[serde(rename = "saved")]
    Saved,
    #[serde(rename = "registration in progress")]
    RegistrationInProgress,
    #[serde(rename = "registered")]
    Registered,
    #[serde(rename = "deletion in progress")]
    DeletionInProgress,
    #[serde(rename = "global error")]
    GlobalError,
}

impl CertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CertStatus::Saved => "saved",
            CertStatus::RegistrationInProgress => "registration in progress",
            CertStatus::Registered => "registered",
            CertStatus::DeletionInProgress => "deletion in progress",
            CertStatus::GlobalError => "global error",
        }
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        [
            CertStatus::Saved,
            CertStatus::RegistrationInProgress,
            CertStatus::Registered,
            CertStatus::DeletionInProgress,
            CertStatus::GlobalError,
        ]
        .into_iter()
        .find(|status| status.as_str() == normalized)
        .ok_or(StatusError::UnknownCertStatus {
            value: s.to_string(),
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("Unknown certificate status: {value}")]
    UnknownCertStatus { value: String },
}
