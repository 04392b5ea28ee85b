//! Adapters - concrete implementations of ports (traits)

mod atomic_file;
mod json_snapshot;
#[cfg(feature = "piv")]
mod piv_token;
mod sealed_key;
mod software_token;

#[cfg(test)]
pub mod fake_module;
#[cfg(test)]
pub mod memory_snapshot;

pub use json_snapshot::JsonSnapshotStore;
#[cfg(feature = "piv")]
pub use piv_token::{PivTokenFinder, PivTokenModule, PIV_MODULE_TYPE};
pub use software_token::{SoftwareTokenFinder, SoftwareTokenModule};
