//! Credential lifecycle and signing authorization for security tokens
//!
//! Tokens (hardware slots or the built-in software token) own keys; keys
//! own certificates and certificate requests. The [`registry`] keeps that
//! hierarchy behind one lock and persists it as a JSON snapshot, the
//! [`authorization`] resolver decides which key may sign for a member, and
//! [`api::CredentialService`] is the entry point for consumers.

pub mod adapters;
pub mod api;
pub mod authorization;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod modules;
pub mod ports;
pub mod registry;
pub mod tracker;
pub mod use_cases;

pub use api::CredentialService;
pub use authorization::{SelectionPolicy, SigningCandidate};
pub use config::SignerConfig;
pub use error::{ErrorKind, SignerError, SignerResult};
pub use registry::{RegistryState, TokenRegistry};
