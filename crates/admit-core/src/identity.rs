//! # Identity Newtypes
//!
//! Newtype wrappers for every identifier in the admissions domain.
//! UUID-based identifiers are valid by construction; the human-facing
//! [`ApplicationNumber`] is validated when parsed.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Declares a UUID-backed identifier with the usual constructors.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// A user of the portal: applicant, admission officer, or admin.
    UserId
);

uuid_identifier!(
    /// An academic department that owns programs.
    DepartmentId
);

uuid_identifier!(
    /// A program applicants can apply to.
    ProgramId
);

uuid_identifier!(
    /// A document requirement within a program's catalog.
    RequirementId
);

uuid_identifier!(
    /// An application aggregate.
    ApplicationId
);

uuid_identifier!(
    /// An uploaded document attached to an application.
    DocumentId
);

impl UserId {
    /// The nil user, used for operator tokens that carry no user id.
    pub fn system() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_system(&self) -> bool {
        self.0.is_nil()
    }
}

/// Human-facing application reference: `APP<year><first 8 hex of id>`.
///
/// Example: `APP2026A1B2C3D4`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ApplicationNumber(String);

impl ApplicationNumber {
    /// Derive the number for an application created in `year`.
    pub fn derive(year: i32, id: &ApplicationId) -> Self {
        let simple = id.as_uuid().simple().to_string();
        Self(format!("APP{year}{}", simple[..8].to_uppercase()))
    }

    /// Parse an existing number, validating its shape.
    pub fn parse(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let valid = s.is_ascii()
            && s.len() == 15
            && s.starts_with("APP")
            && s[3..7].chars().all(|c| c.is_ascii_digit())
            && s[7..]
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c));
        if !valid {
            return Err(ValidationError::InvalidApplicationNumber(s));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ApplicationNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(raw).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for ApplicationNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
