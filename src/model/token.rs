//! Security tokens and the descriptors modules report for them

use super::{Key, SignMechanism, TokenStatus};

/// Module type of the built-in software token
pub const SOFTWARE_MODULE_TYPE: &str = "softToken";

/// Identifier of the built-in software token
pub const SOFTWARE_TOKEN_ID: &str = "0";

/// What a module reports about one of its slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDescriptor {
    pub id: String,
    pub module_type: String,
    pub serial_number: Option<String>,
    pub label: Option<String>,
    pub slot_index: u32,
    pub read_only: bool,
    pub batch_signing_enabled: bool,
    pub sign_mechanism: SignMechanism,
    /// Login state the module reports at discovery time
    pub status: TokenStatus,
}

impl TokenDescriptor {
    pub fn software(status: TokenStatus) -> Self {
        Self {
            id: SOFTWARE_TOKEN_ID.to_string(),
            module_type: SOFTWARE_MODULE_TYPE.to_string(),
            serial_number: None,
            label: None,
            slot_index: 0,
            read_only: false,
            batch_signing_enabled: true,
            sign_mechanism: SignMechanism::EdDsa,
            status,
        }
    }

    /// `moduleType[-serial][-label][-slotIndex]`
    pub fn default_friendly_name(&self) -> String {
        let mut name = self.module_type.clone();
        if let Some(serial) = &self.serial_number {
            name.push('-');
            name.push_str(serial);
        }
        if let Some(label) = &self.label {
            name.push('-');
            name.push_str(label);
        }
        if self.module_type != SOFTWARE_MODULE_TYPE {
            name.push('-');
            name.push_str(&self.slot_index.to_string());
        }
        name
    }

    /// True when `token` is the registry entry for this slot
    pub fn identifies(&self, token: &Token) -> bool {
        token.id == self.id
            || (token.module_type == self.module_type
                && token.serial_number == self.serial_number
                && token.label == self.label
                && token.slot_index == self.slot_index)
    }
}

/// One security module instance: a hardware slot or the software token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub id: String,
    pub module_type: String,
    pub friendly_name: Option<String>,
    pub serial_number: Option<String>,
    pub label: Option<String>,
    pub slot_index: u32,
    pub read_only: bool,
    pub batch_signing_enabled: bool,
    pub sign_mechanism: SignMechanism,
    /// The module is currently reachable
    pub available: bool,
    /// The token is logged in
    pub active: bool,
    pub status: TokenStatus,
    pub keys: Vec<Key>,
}

impl Token {
    pub fn from_descriptor(descriptor: &TokenDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            module_type: descriptor.module_type.clone(),
            friendly_name: Some(descriptor.default_friendly_name()),
            serial_number: descriptor.serial_number.clone(),
            label: descriptor.label.clone(),
            slot_index: descriptor.slot_index,
            read_only: descriptor.read_only,
            batch_signing_enabled: descriptor.batch_signing_enabled,
            sign_mechanism: descriptor.sign_mechanism,
            available: true,
            active: false,
            status: descriptor.status,
            keys: Vec::new(),
        }
    }

    pub fn is_software(&self) -> bool {
        self.module_type == SOFTWARE_MODULE_TYPE
    }

    /// Reachable and logged in
    pub fn is_usable(&self) -> bool {
        self.active && self.available
    }

    pub fn key(&self, key_id: &str) -> Option<&Key> {
        self.keys.iter().find(|key| key.id == key_id)
    }
}
