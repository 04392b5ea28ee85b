//! Domain model: tokens own keys, keys own certificates and requests

mod cert;
mod cert_request;
mod client_id;
mod key;
mod key_usage;
mod pin;
mod sign_mechanism;
mod status;
mod token;

pub use cert::{Cert, NewCertificate, OcspResponse, RenewalState};
pub use cert_request::{CertRequest, CertRequestOutcome, NewCertRequest};
pub use client_id::{ClientId, ClientIdError};
pub use key::Key;
pub use key_usage::{KeyUsage, KeyUsageError};
pub use pin::{Pin, PinError};
pub use sign_mechanism::{SignMechanism, SignMechanismError};
pub use status::{CertStatus, StatusError, TokenStatus};
pub use token::{Token, TokenDescriptor, SOFTWARE_MODULE_TYPE, SOFTWARE_TOKEN_ID};
