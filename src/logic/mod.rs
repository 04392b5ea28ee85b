mod certificate;
mod ids;
mod merge;
pub(crate) mod snapshot;

pub use certificate::{inspect_certificate, CertificateInfo};
pub use ids::{cert_hash, random_id};
pub use merge::{merge_onto_file_tokens, MergeOutcome};
