//! Use cases (orchestration)
//!
//! Each use case coordinates the registry with the module manager. The
//! registry lock is never held across a module call.

mod activate_token;
mod cert_request;
mod delete_key;
mod generate_key;
mod import_certificate;
mod refresh;
mod sign;

pub use activate_token::{activate_token, deactivate_token, initialize_token};
pub use cert_request::{delete_cert_request, request_certificate};
pub use delete_key::delete_key;
pub use generate_key::generate_key;
pub use import_certificate::{delete_certificate, import_certificate, ImportOptions};
pub use refresh::refresh;
pub use sign::{sign_for_member, sign_with_key, MemberSignature};
