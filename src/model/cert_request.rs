use super::ClientId;

/// Pending enrollment for a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertRequest {
    pub id: String,
    pub key_id: String,
    pub member_id: Option<ClientId>,
    pub subject_name: String,
    pub subject_alt_name: Option<String>,
    pub certificate_profile: Option<String>,
}

impl CertRequest {
    /// Same request as (`member_id`, `subject_name`)
    ///
    /// Subjects compare case-insensitively. Without a member the
    /// subject alone decides.
    pub fn matches(&self, member_id: Option<&ClientId>, subject_name: &str) -> bool {
        let same_member = match member_id {
            None => true,
            Some(member_id) => self.member_id.as_ref() == Some(member_id),
        };
        same_member && self.subject_name.eq_ignore_ascii_case(subject_name)
    }
}

/// Parameters for registering a certificate request
#[derive(Debug, Clone)]
pub struct NewCertRequest {
    pub member_id: Option<ClientId>,
    pub subject_name: String,
    pub subject_alt_name: Option<String>,
    pub certificate_profile: Option<String>,
}

impl NewCertRequest {
    pub fn new(member_id: Option<ClientId>, subject_name: impl Into<String>) -> Self {
        Self {
            member_id,
            subject_name: subject_name.into(),
            subject_alt_name: None,
            certificate_profile: None,
        }
    }

    pub fn subject_alt_name(mut self, value: impl Into<String>) -> Self {
        self.subject_alt_name = Some(value.into());
        self
    }

    pub fn certificate_profile(mut self, value: impl Into<String>) -> Self {
        self.certificate_profile = Some(value.into());
        self
    }
}

/// Result of registering a certificate request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertRequestOutcome {
    Created(String),
    /// An equivalent request already existed
    Existing(String),
}

impl CertRequestOutcome {
    pub fn id(&self) -> &str {
        match self {
            CertRequestOutcome::Created(id) | CertRequestOutcome::Existing(id) => id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, CertRequestOutcome::Created(_))
    }
}
