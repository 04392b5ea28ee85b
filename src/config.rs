//! Signer configuration
//!
//! Read from a JSON file; every field has a default, so an empty object is
//! a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::authorization::SelectionPolicy;
use crate::error::{ConfigError, SignerError, SignerResult};

const DEFAULT_KEY_CONF_PATH: &str = "/etc/tokensign/keyconf.json";
const DEFAULT_SOFTWARE_TOKEN_DIR: &str = "/etc/tokensign/softtoken";
const DEFAULT_PIN_KDF_ROUNDS: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignerConfig {
    /// Snapshot of tokens, keys, certificates and requests
    #[serde(default = "default_key_conf_path")]
    pub key_conf_path: PathBuf,

    /// PIN marker and sealed key files of the software token
    #[serde(default = "default_software_token_dir")]
    pub software_token_dir: PathBuf,

    #[serde(default)]
    pub selection_policy: SelectionPolicy,

    /// Write the snapshot after every change to persisted fields
    #[serde(default = "default_autosave")]
    pub autosave: bool,

    /// PBKDF2 rounds used to seal software keys under the PIN
    #[serde(default = "default_pin_kdf_rounds")]
    pub pin_kdf_rounds: u32,

    /// Discover PIV tokens; needs the `piv` feature
    #[serde(default)]
    pub piv_enabled: bool,
}

fn default_key_conf_path() -> PathBuf {
    PathBuf::from(DEFAULT_KEY_CONF_PATH)
}

fn default_software_token_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SOFTWARE_TOKEN_DIR)
}

fn default_autosave() -> bool {
    true
}

fn default_pin_kdf_rounds() -> u32 {
    DEFAULT_PIN_KDF_ROUNDS
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            key_conf_path: default_key_conf_path(),
            software_token_dir: default_software_token_dir(),
            selection_policy: SelectionPolicy::default(),
            autosave: default_autosave(),
            pin_kdf_rounds: default_pin_kdf_rounds(),
            piv_enabled: false,
        }
    }
}

impl SignerConfig {
    /// Read and validate a JSON configuration file
    ///
    /// # Errors
    ///
    /// Returns errors if the file cannot be read, is not valid JSON, names
    /// an unknown field, or fails [`validate`](Self::validate).
    pub fn load(path: impl AsRef<Path>) -> SignerResult<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SignerResult<()> {
        if self.pin_kdf_rounds == 0 {
            return Err(invalid("pin_kdf_rounds must be positive"));
        }
        if self.key_conf_path.as_os_str().is_empty() {
            return Err(invalid("key_conf_path is empty"));
        }
        if self.software_token_dir.as_os_str().is_empty() {
            return Err(invalid("software_token_dir is empty"));
        }
        if self.piv_enabled && !cfg!(feature = "piv") {
            warn!("piv_enabled is set but PIV support is not compiled in");
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> SignerError {
    ConfigError::Invalid {
        reason: reason.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ErrorKind;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_object_gives_defaults() {
        let file = write_config("{}");
        let config = SignerConfig::load(file.path()).unwrap();
        assert_eq!(config, SignerConfig::default());
        assert_eq!(config.pin_kdf_rounds, 100_000);
        assert!(config.autosave);
    }

    #[test]
    fn test_overrides() {
        let file = write_config(
            r#"{
                "key_conf_path": "/tmp/keyconf.json",
                "selection_policy": "most-recently-activated",
                "autosave": false,
                "pin_kdf_rounds": 10
            }"#,
        );
        let config = SignerConfig::load(file.path()).unwrap();
        assert_eq!(config.key_conf_path, PathBuf::from("/tmp/keyconf.json"));
        assert_eq!(config.selection_policy, SelectionPolicy::MostRecentlyActivated);
        assert!(!config.autosave);
        assert_eq!(config.pin_kdf_rounds, 10);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let file = write_config(r#"{ "pin_rounds": 10 }"#);
        let err = SignerConfig::load(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_zero_rounds_is_invalid() {
        let file = write_config(r#"{ "pin_kdf_rounds": 0 }"#);
        assert!(SignerConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = SignerConfig::load("/nonexistent/tokensign.json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
