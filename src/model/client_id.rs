//! Member and subsystem identifiers

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SEPARATOR: char = '/';

/// Federation identity a certificate can be bound to
///
/// Written as `INSTANCE/CLASS/CODE` for a member and
/// `INSTANCE/CLASS/CODE/SUBSYSTEM` for one of its subsystems.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId {
    instance: String,
    member_class: String,
    member_code: String,
    subsystem: Option<String>,
}

impl ClientId {
    pub fn member(
        instance: impl Into<String>,
        member_class: impl Into<String>,
        member_code: impl Into<String>,
    ) -> Result<Self, ClientIdError> {
        let id = Self {
            instance: instance.into(),
            member_class: member_class.into(),
            member_code: member_code.into(),
            subsystem: None,
        };
        id.validate()?;
        Ok(id)
    }

    pub fn subsystem(
        instance: impl Into<String>,
        member_class: impl Into<String>,
        member_code: impl Into<String>,
        subsystem: impl Into<String>,
    ) -> Result<Self, ClientIdError> {
        let id = Self {
            instance: instance.into(),
            member_class: member_class.into(),
            member_code: member_code.into(),
            subsystem: Some(subsystem.into()),
        };
        id.validate()?;
        Ok(id)
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn member_class(&self) -> &str {
        &self.member_class
    }

    pub fn member_code(&self) -> &str {
        &self.member_code
    }

    pub fn subsystem_code(&self) -> Option<&str> {
        self.subsystem.as_deref()
    }

    pub fn is_subsystem(&self) -> bool {
        self.subsystem.is_some()
    }

    /// The owning member of this identity (itself when already a member)
    pub fn member_id(&self) -> ClientId {
        Self {
            subsystem: None,
            ..self.clone()
        }
    }

    /// True when `self` is a subsystem whose owning member is `member`
    pub fn subsystem_contains_member(&self, member: &ClientId) -> bool {
        self.is_subsystem()
            && !member.is_subsystem()
            && self.instance == member.instance
            && self.member_class == member.member_class
            && self.member_code == member.member_code
    }

    fn validate(&self) -> Result<(), ClientIdError> {
        let parts = [
            Some(&self.instance),
            Some(&self.member_class),
            Some(&self.member_code),
            self.subsystem.as_ref(),
        ];
        for part in parts.into_iter().flatten() {
            if part.trim().is_empty() {
                return Err(ClientIdError::EmptyPart {
                    value: self.to_string(),
                });
            }
            if part.contains(SEPARATOR) {
                return Err(ClientIdError::InvalidFormat {
                    value: self.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.instance, self.member_class, self.member_code
        )?;
        if let Some(subsystem) = &self.subsystem {
            write!(f, "/{subsystem}")?;
        }
        Ok(())
    }
}

impl FromStr for ClientId {
    type Err = ClientIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        match parts.as_slice() {
            [instance, class, code] => Self::member(*instance, *class, *code),
            [instance, class, code, subsystem] => {
                Self::subsystem(*instance, *class, *code, *subsystem)
            }
            _ => Err(ClientIdError::InvalidFormat {
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientIdError {
    #[error("Invalid client identifier '{value}', expected INSTANCE/CLASS/CODE[/SUBSYSTEM]")]
    InvalidFormat { value: String },

    #[error("Client identifier '{value}' has an empty part")]
    EmptyPart { value: String },
}
