use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Purpose a key is bound to once its first certificate or request arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyUsage {
    Signing,
    Authentication,
}

impl KeyUsage {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyUsage::Signing => "SIGNING",
            KeyUsage::Authentication => "AUTHENTICATION",
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyUsage {
    type Err = KeyUsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SIGNING" | "SIGN" => Ok(KeyUsage::Signing),
            "AUTHENTICATION" | "AUTH" => Ok(KeyUsage::Authentication),
            _ => Err(KeyUsageError::Unknown {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyUsageError {
    #[error("Unknown key usage: {value}")]
    Unknown { value: String },
}
