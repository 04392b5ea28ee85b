//! PIV (Personal Identity Verification) tokens on YubiKey devices
//!
//! Every connected YubiKey becomes one token whose id is the device serial.
//! The four standard PIV slots holding a certificate are exposed as keys
//! `<serial>-<slot>`. Keys are provisioned with the vendor tooling; this
//! module only logs in and signs.

use tracing::{debug, info, warn};
use yubikey::piv::{sign_data, AlgorithmId, SlotId};
use yubikey::{Certificate, Context, YubiKey};

use crate::error::{ModuleError, SignerResult};
use crate::model::{Pin, SignMechanism, TokenDescriptor, TokenStatus};
use crate::ports::{KeyConfig, KeyHandle, KeyManager, ModuleFinder, PinVerifier, Signer, TokenModule};

pub const PIV_MODULE_TYPE: &str = "piv";

static SLOTS: [(SlotId, &str); 4] = [
    (SlotId::Authentication, "9a"),
    (SlotId::Signature, "9c"),
    (SlotId::KeyManagement, "9d"),
    (SlotId::CardAuthentication, "9e"),
];

fn device_error(context: &str, e: yubikey::Error) -> ModuleError {
    ModuleError::Device {
        reason: format!("{context}: {e}"),
    }
}

fn connected_devices() -> SignerResult<Vec<(String, YubiKey)>> {
    let mut readers = Context::open().map_err(|e| device_error("Failed to open PC/SC context", e))?;
    let mut devices = Vec::new();
    for reader in readers
        .iter()
        .map_err(|e| device_error("Failed to iterate readers", e))?
    {
        let name = reader.name().to_string();
        match reader.open() {
            Ok(yk) => devices.push((name, yk)),
            Err(e) => debug!("Skipping reader {name}: {e}"),
        }
    }
    Ok(devices)
}

/// Finds YubiKeys over PC/SC
#[derive(Debug, Clone, Default)]
pub struct PivTokenFinder;

impl ModuleFinder for PivTokenFinder {
    fn module_type(&self) -> &str {
        PIV_MODULE_TYPE
    }

    fn list_available_slots(&self) -> SignerResult<Vec<TokenDescriptor>> {
        Ok(connected_devices()?
            .into_iter()
            .map(|(reader, yk)| {
                let serial = yk.serial().to_string();
                TokenDescriptor {
                    id: serial.clone(),
                    module_type: PIV_MODULE_TYPE.to_string(),
                    serial_number: Some(serial),
                    label: Some(reader),
                    slot_index: 0,
                    read_only: false,
                    batch_signing_enabled: false,
                    sign_mechanism: SignMechanism::Ecdsa,
                    status: TokenStatus::Ok,
                }
            })
            .collect())
    }

    fn open(&self, descriptor: &TokenDescriptor) -> SignerResult<Box<dyn TokenModule>> {
        let device = connected_devices()?
            .into_iter()
            .map(|(_, yk)| yk)
            .find(|yk| yk.serial().to_string() == descriptor.id)
            .ok_or_else(|| ModuleError::Unavailable {
                token_id: descriptor.id.clone(),
            })?;
        info!("Opened PIV token {}", descriptor.id);
        Ok(Box::new(PivTokenModule::new(descriptor.id.clone(), device)))
    }
}

/// Slots holding a certificate, as keys
fn read_handles(token_id: &str, device: &mut YubiKey) -> Vec<KeyHandle> {
    let mut handles = Vec::new();
    for (slot, name) in SLOTS {
        let Ok(cert) = Certificate::read(device, slot) else {
            continue;
        };
        let spki = &cert.cert.tbs_certificate.subject_public_key_info;
        handles.push(KeyHandle {
            key_id: format!("{token_id}-{name}"),
            label: Some(format!("slot {name}")),
            public_key: Some(spki.subject_public_key.raw_bytes().to_vec()),
            sign_mechanism: SignMechanism::Ecdsa,
        });
    }
    handles
}

/// One connected YubiKey
pub struct PivTokenModule {
    token_id: String,
    device: YubiKey,
    handles: Vec<KeyHandle>,
    unlocked: bool,
    status: TokenStatus,
}

impl PivTokenModule {
    /// Slots are read once here; the PIV slot layout does not change while connected
    pub fn new(token_id: String, mut device: YubiKey) -> Self {
        let handles = read_handles(&token_id, &mut device);
        Self {
            token_id,
            device,
            handles,
            unlocked: false,
            status: TokenStatus::Ok,
        }
    }

    fn slot(&self, key_id: &str) -> SignerResult<SlotId> {
        key_id
            .strip_prefix(&self.token_id)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|suffix| SLOTS.iter().find(|(_, name)| *name == suffix))
            .map(|(slot, _)| *slot)
            .ok_or_else(|| {
                ModuleError::KeyNotFound {
                    key_id: key_id.to_string(),
                }
                .into()
            })
    }

    fn unsupported(operation: &str) -> SignerResult<()> {
        Err(ModuleError::Unsupported {
            operation: format!("{operation} on PIV tokens"),
        }
        .into())
    }
}

impl PinVerifier for PivTokenModule {
    fn initialize(&mut self, _pin: &Pin) -> SignerResult<()> {
        Self::unsupported("PIN initialization")
    }

    fn unlock(&mut self, pin: &Pin) -> SignerResult<bool> {
        match self.device.verify_pin(pin.as_bytes()) {
            Ok(()) => {
                self.unlocked = true;
                self.status = TokenStatus::Ok;
                debug!("PIN verified for PIV token {}", self.token_id);
                Ok(true)
            }
            Err(yubikey::Error::WrongPin { tries }) => {
                warn!("Wrong PIN for PIV token {}, {tries} tries left", self.token_id);
                self.unlocked = false;
                self.status = match tries {
                    0 => TokenStatus::UserPinLocked,
                    1 => TokenStatus::UserPinFinalTry,
                    2 => TokenStatus::UserPinCountLow,
                    _ => TokenStatus::UserPinIncorrect,
                };
                Ok(false)
            }
            Err(yubikey::Error::PinLocked) => {
                self.unlocked = false;
                self.status = TokenStatus::UserPinLocked;
                Ok(false)
            }
            Err(e) => Err(device_error("PIN verification failed", e).into()),
        }
    }

    fn lock(&mut self) -> SignerResult<()> {
        self.unlocked = false;
        Ok(())
    }

    fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    fn status(&self) -> TokenStatus {
        self.status
    }
}

impl KeyManager for PivTokenModule {
    fn key_handles(&self) -> SignerResult<Vec<KeyHandle>> {
        Ok(self.handles.clone())
    }

    fn generate_key(&mut self, _config: &KeyConfig) -> SignerResult<KeyHandle> {
        Err(ModuleError::Unsupported {
            operation: "key generation on PIV tokens".to_string(),
        }
        .into())
    }

    fn delete_key(&mut self, _key_id: &str) -> SignerResult<()> {
        Self::unsupported("key deletion")
    }
}

impl Signer for PivTokenModule {
    fn sign(
        &mut self,
        key_id: &str,
        mechanism: SignMechanism,
        digest: &[u8],
    ) -> SignerResult<Vec<u8>> {
        if !self.unlocked {
            return Err(ModuleError::NotLoggedIn {
                token_id: self.token_id.clone(),
            }
            .into());
        }
        if mechanism != SignMechanism::Ecdsa {
            return Err(ModuleError::Unsupported {
                operation: format!("PIV signing with {mechanism}"),
            }
            .into());
        }
        let slot = self.slot(key_id)?;

        debug!("Signing {} bytes with PIV key {key_id}", digest.len());
        let signature = sign_data(&mut self.device, digest, AlgorithmId::EccP256, slot)
            .map_err(|e| device_error("Signing failed", e))?;
        Ok(signature.to_vec())
    }
}
