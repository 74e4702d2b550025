//! # Principal Roles
//!
//! The closed set of principal kinds. A role determines which routes a
//! principal may call and which role-specific profile data it carries.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The kind of an authenticated principal.
///
/// Unlike an ordered privilege ladder, these roles are disjoint: an admin is
/// not "more of a student". Route gates therefore test set membership, not
/// `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A student enrolled in an exam or class programme.
    Student,
    /// A paying member of the organization.
    Member,
    /// A volunteer awaiting or holding admin approval.
    Volunteer,
    /// A portal administrator.
    Admin,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 4] = [Role::Student, Role::Member, Role::Volunteer, Role::Admin];

    /// Return the string representation of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Member => "member",
            Self::Volunteer => "volunteer",
            Self::Admin => "admin",
        }
    }

    /// Whether principals of this role may register themselves.
    ///
    /// Admins are only ever created by configuration bootstrap.
    pub fn is_self_service(&self) -> bool {
        !matches!(self, Self::Admin)
    }

    /// Prefix of the human-readable sequential identifier for this role.
    pub fn identifier_prefix(&self) -> &'static str {
        match self {
            Self::Student => "STU",
            Self::Member => "MEM",
            Self::Volunteer => "VOL",
            Self::Admin => "ADM",
        }
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
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "member" => Ok(Self::Member),
            "volunteer" => Ok(Self::Volunteer),
            "admin" => Ok(Self::Admin),
            _ => Err(ValidationError::UnknownRole(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!("Volunteer".parse::<Role>().unwrap(), Role::Volunteer);
    }

    #[test]
    fn unknown_role_is_validation_error() {
        let err = "superuser".parse::<Role>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownRole("superuser".into()));
    }

    #[test]
    fn only_admin_is_not_self_service() {
        assert!(Role::Student.is_self_service());
        assert!(Role::Member.is_self_service());
        assert!(Role::Volunteer.is_self_service());
        assert!(!Role::Admin.is_self_service());
    }

    #[test]
    fn role_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Role::Member).unwrap(), "\"member\"");
    }
}
