//! Ports (traits) at the edges of the credential engine
//!
//! The registry and use cases depend on these abstractions, never on a
//! concrete module or storage backend. Security modules are reached
//! through [`ModuleFinder`] and [`TokenModule`]; the durable snapshot
//! through [`SnapshotStore`].

mod key_manager;
mod module_finder;
mod pin_verifier;
mod signer;
mod snapshot_store;

pub use key_manager::{KeyConfig, KeyHandle, KeyManager};
pub use module_finder::ModuleFinder;
pub use pin_verifier::PinVerifier;
pub use signer::Signer;
pub use snapshot_store::SnapshotStore;

/// Combined trait for everything a token module does
///
/// One instance exists per token; it is only ever used from one thread at
/// a time, behind the module manager's per-token lock.
pub trait TokenModule: PinVerifier + KeyManager + Signer + Send {}

// Blanket implementation for types that implement all operation traits
impl<T> TokenModule for T where T: PinVerifier + KeyManager + Signer + Send {}
