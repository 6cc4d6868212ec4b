//! # Roles and Actors
//!
//! The caller of every service operation is an explicit [`Actor`]. Role
//! checks are capability queries on the actor, never presentation logic.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::UserId;

/// Portal role. Determines which operations a caller may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Prospective student; owns their applications.
    Applicant,
    /// Staff member who reviews applications.
    AdmissionOfficer,
    /// Staff member who also manages the program catalog.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applicant => "applicant",
            Self::AdmissionOfficer => "admission_officer",
            Self::Admin => "admin",
        }
    }

    /// Admission officers and admins.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::AdmissionOfficer | Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applicant" => Ok(Self::Applicant),
            "admission_officer" => Ok(Self::AdmissionOfficer),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// The authenticated caller of a service operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn applicant(user_id: UserId) -> Self {
        Self::new(user_id, Role::Applicant)
    }

    pub fn officer(user_id: UserId) -> Self {
        Self::new(user_id, Role::AdmissionOfficer)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when this actor is an applicant and `owner` is their own id.
    pub fn owns(&self, owner: &UserId) -> bool {
        self.role == Role::Applicant && self.user_id == *owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_parses_wire_names() {
        assert_eq!(Role::from_str("applicant").unwrap(), Role::Applicant);
        assert_eq!(
            Role::from_str("admission_officer").unwrap(),
            Role::AdmissionOfficer
        );
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert!(Role::from_str("superadmin").is_err());
    }

    #[test]
    fn role_serde_matches_display() {
        for role in [Role::Applicant, Role::AdmissionOfficer, Role::Admin] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{role}\""));
        }
    }

    #[test]
    fn staff_roles() {
        assert!(!Role::Applicant.is_staff());
        assert!(Role::AdmissionOfficer.is_staff());
        assert!(Role::Admin.is_staff());
    }

    #[test]
    fn only_applicants_own_records() {
        let user = UserId::new();
        assert!(Actor::applicant(user).owns(&user));
        assert!(!Actor::applicant(UserId::new()).owns(&user));
        // Staff never "own" an application, even with a matching id.
        assert!(!Actor::admin(user).owns(&user));
    }
}
