//! # Principals
//!
//! A principal is anyone who can authenticate: a student, member, volunteer
//! or admin. All four share one record shape with a [`RoleProfile`] for the
//! role-specific status, so authentication is written once and parameterized
//! by [`Role`].
//!
//! ## Role-specific lifecycle
//!
//! ```text
//! Student:    registered ──fee approved──▶ fee_paid ──admin──▶ roll_number assigned
//! Volunteer:  registered ──admin approve──▶ is_approved
//! Member:     registered ──membership approved──▶ membership.active
//! Admin:      bootstrapped from configuration
//! ```
//!
//! Principals are never deleted. Every mutation below checks the role first
//! and fails with [`PrincipalError::WrongRole`] rather than silently ignoring
//! a mismatched profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use campus_core::error::require_field;
use campus_core::{Email, PrincipalId, Role, ValidationError};
use campus_crypto::password::check_secret_strength;
use campus_crypto::SecretHash;

use crate::transaction::ApprovalEffect;

/// Render the sequential human-readable identifier for a role, e.g. `STU-000042`.
pub fn format_identifier(role: Role, sequence: u64) -> String {
    format!("{}-{:06}", role.identifier_prefix(), sequence)
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors from principal mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrincipalError {
    /// The operation applies to a different role.
    #[error("operation requires a {expected}, but principal is a {actual}")]
    WrongRole {
        /// Role the operation applies to.
        expected: Role,
        /// Role of the principal.
        actual: Role,
    },

    /// A roll number was requested before the student's fee was paid.
    #[error("student fee has not been paid")]
    FeeNotPaid,

    /// The volunteer is already approved.
    #[error("volunteer is already approved")]
    AlreadyApproved,

    /// Input failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ─── Role Profiles ───────────────────────────────────────────────────

/// Fee status of a student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeStatus {
    /// Whether an approved fee payment has been recorded.
    pub fee_paid: bool,
    /// Fee tier assigned by an admin.
    pub fee_level: Option<String>,
    /// Amount due, or the amount paid once approved.
    pub fee_amount: Option<i64>,
    /// When the fee payment was approved.
    pub payment_date: Option<DateTime<Utc>>,
}

/// Student-specific status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    /// Sequential identifier, `STU-000001`.
    pub registration_number: String,
    /// Class or course the student registered for.
    pub class_name: String,
    /// Exam roll number, assigned by an admin after the fee is paid.
    pub roll_number: Option<String>,
    /// Fee status.
    pub fee: FeeStatus,
}

/// Volunteer-specific status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolunteerProfile {
    /// Sequential identifier, `VOL-000001`.
    pub volunteer_number: String,
    /// Whether an admin has approved the volunteer.
    pub is_approved: bool,
    /// Whether the volunteer is active.
    pub is_active: bool,
    /// When the volunteer was approved.
    pub approved_at: Option<DateTime<Utc>>,
    /// Admin who approved the volunteer.
    pub approved_by: Option<PrincipalId>,
}

/// Membership activation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipStatus {
    /// Whether the membership is active.
    pub active: bool,
    /// When the membership was first activated.
    pub activated_at: Option<DateTime<Utc>>,
}

/// Member-specific status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProfile {
    /// Sequential identifier, `MEM-000001`.
    pub membership_number: String,
    /// Activation state.
    pub membership: MembershipStatus,
}

/// Admin-specific data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminProfile {
    /// Sequential identifier, `ADM-000001`.
    pub admin_number: String,
}

/// Role-specific portion of a principal, tagged by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleProfile {
    /// A student.
    Student(StudentProfile),
    /// A member.
    Member(MemberProfile),
    /// A volunteer.
    Volunteer(VolunteerProfile),
    /// An admin.
    Admin(AdminProfile),
}

impl RoleProfile {
    /// Role this profile belongs to.
    pub fn role(&self) -> Role {
        match self {
            Self::Student(_) => Role::Student,
            Self::Member(_) => Role::Member,
            Self::Volunteer(_) => Role::Volunteer,
            Self::Admin(_) => Role::Admin,
        }
    }

    /// A fresh profile for a newly registered principal.
    pub fn initial(role: Role, identifier: String, class_name: Option<String>) -> Self {
        match role {
            Role::Student => Self::Student(StudentProfile {
                registration_number: identifier,
                class_name: class_name.unwrap_or_default(),
                roll_number: None,
                fee: FeeStatus::default(),
            }),
            Role::Member => Self::Member(MemberProfile {
                membership_number: identifier,
                membership: MembershipStatus::default(),
            }),
            Role::Volunteer => Self::Volunteer(VolunteerProfile {
                volunteer_number: identifier,
                is_approved: false,
                is_active: true,
                approved_at: None,
                approved_by: None,
            }),
            Role::Admin => Self::Admin(AdminProfile {
                admin_number: identifier,
            }),
        }
    }

    /// The sequential identifier, whatever the role calls it.
    pub fn identifier(&self) -> &str {
        match self {
            Self::Student(p) => &p.registration_number,
            Self::Member(p) => &p.membership_number,
            Self::Volunteer(p) => &p.volunteer_number,
            Self::Admin(p) => &p.admin_number,
        }
    }
}

// ─── Registration ────────────────────────────────────────────────────

/// Raw registration input, as submitted.
#[derive(Clone)]
pub struct Registration {
    /// Role being registered.
    pub role: Role,
    /// Email, not yet normalized.
    pub email: String,
    /// Plaintext secret.
    pub secret: String,
    /// Display name.
    pub name: String,
    /// Phone number.
    pub phone: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// City.
    pub city: Option<String>,
    /// Class name, required for students.
    pub class_name: Option<String>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("role", &self.role)
            .field("email", &self.email)
            .field("secret", &"[REDACTED]")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registration input that passed validation. The secret is returned
/// separately by [`Registration::validate`] so it can be hashed and dropped.
#[derive(Debug, Clone)]
pub struct ValidatedRegistration {
    /// Role being registered.
    pub role: Role,
    /// Normalized email.
    pub email: Email,
    /// Non-blank contact details.
    pub details: PrincipalDetails,
    /// Trimmed class name (students only).
    pub class_name: Option<String>,
}

fn optional_trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Registration {
    /// Validate every field, returning the validated registration and the
    /// plaintext secret.
    ///
    /// Checks, in order: email format, secret length, non-blank name, and
    /// for students a non-blank class name.
    pub fn validate(self) -> Result<(ValidatedRegistration, String), ValidationError> {
        let email = Email::new(self.email)?;
        check_secret_strength(&self.secret)?;
        let name = require_field(Some(&self.name), "name")?;
        let class_name = match self.role {
            Role::Student => Some(require_field(self.class_name.as_deref(), "class_name")?),
            _ => None,
        };
        Ok((
            ValidatedRegistration {
                role: self.role,
                email,
                details: PrincipalDetails {
                    name,
                    phone: optional_trimmed(self.phone),
                    address: optional_trimmed(self.address),
                    city: optional_trimmed(self.city),
                },
                class_name,
            },
            self.secret,
        ))
    }
}

impl ValidatedRegistration {
    /// Build the principal once an identifier has been allocated and the
    /// secret hashed.
    pub fn into_principal(
        self,
        identifier: String,
        secret_hash: SecretHash,
        now: DateTime<Utc>,
    ) -> Principal {
        Principal {
            id: PrincipalId::new(),
            email: self.email,
            secret_hash,
            details: self.details,
            profile: RoleProfile::initial(self.role, identifier, self.class_name),
            created_at: now,
            updated_at: now,
        }
    }
}

// ─── Principal ───────────────────────────────────────────────────────

/// Contact details shared by every role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalDetails {
    /// Display name.
    pub name: String,
    /// Phone number.
    pub phone: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// City.
    pub city: Option<String>,
}

/// An authenticated party of any role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Unique identifier.
    pub id: PrincipalId,
    /// Normalized email, unique per role.
    pub email: Email,
    /// Argon2id hash of the secret.
    pub secret_hash: SecretHash,
    /// Contact details.
    pub details: PrincipalDetails,
    /// Role-specific status.
    pub profile: RoleProfile,
    /// When the principal registered.
    pub created_at: DateTime<Utc>,
    /// When the principal was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Principal {
    /// The principal's role.
    pub fn role(&self) -> Role {
        self.profile.role()
    }

    /// The sequential identifier (`STU-…`, `VOL-…`, `MEM-…`, `ADM-…`).
    pub fn identifier(&self) -> &str {
        self.profile.identifier()
    }

    /// Student profile, if this is a student.
    pub fn as_student(&self) -> Option<&StudentProfile> {
        match &self.profile {
            RoleProfile::Student(p) => Some(p),
            _ => None,
        }
    }

    /// Member profile, if this is a member.
    pub fn as_member(&self) -> Option<&MemberProfile> {
        match &self.profile {
            RoleProfile::Member(p) => Some(p),
            _ => None,
        }
    }

    /// Volunteer profile, if this is a volunteer.
    pub fn as_volunteer(&self) -> Option<&VolunteerProfile> {
        match &self.profile {
            RoleProfile::Volunteer(p) => Some(p),
            _ => None,
        }
    }

    fn student_mut(&mut self) -> Result<&mut StudentProfile, PrincipalError> {
        let actual = self.role();
        match &mut self.profile {
            RoleProfile::Student(p) => Ok(p),
            _ => Err(PrincipalError::WrongRole {
                expected: Role::Student,
                actual,
            }),
        }
    }

    /// Replace the secret hash after a password reset.
    pub fn set_secret_hash(&mut self, hash: SecretHash, now: DateTime<Utc>) {
        self.secret_hash = hash;
        self.updated_at = now;
    }

    /// Assign a student's fee tier and amount due.
    pub fn assign_fee_level(
        &mut self,
        level: &str,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<(), PrincipalError> {
        let level = require_field(Some(level), "fee_level")?;
        if amount <= 0 {
            return Err(ValidationError::NonPositiveAmount {
                field: "fee_amount",
            }
            .into());
        }
        let student = self.student_mut()?;
        student.fee.fee_level = Some(level);
        student.fee.fee_amount = Some(amount);
        self.updated_at = now;
        Ok(())
    }

    /// Assign a student's exam roll number. Requires the fee to be paid.
    ///
    /// Uniqueness across students is the store's concern.
    pub fn assign_roll_number(
        &mut self,
        roll_number: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PrincipalError> {
        let roll_number = require_field(Some(roll_number), "roll_number")?;
        let student = self.student_mut()?;
        if !student.fee.fee_paid {
            return Err(PrincipalError::FeeNotPaid);
        }
        student.roll_number = Some(roll_number);
        self.updated_at = now;
        Ok(())
    }

    /// Approve a volunteer.
    pub fn approve_volunteer(
        &mut self,
        admin: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<(), PrincipalError> {
        let actual = self.role();
        let volunteer = match &mut self.profile {
            RoleProfile::Volunteer(p) => p,
            _ => {
                return Err(PrincipalError::WrongRole {
                    expected: Role::Volunteer,
                    actual,
                })
            }
        };
        if volunteer.is_approved {
            return Err(PrincipalError::AlreadyApproved);
        }
        volunteer.is_approved = true;
        volunteer.is_active = true;
        volunteer.approved_at = Some(now);
        volunteer.approved_by = Some(admin);
        self.updated_at = now;
        Ok(())
    }

    /// Apply the principal-side effect of an approved payment.
    ///
    /// Returns `Ok(false)` for [`ApprovalEffect::None`]. Activating an
    /// already-active membership keeps the original activation time.
    pub fn apply_approval_effect(
        &mut self,
        effect: &ApprovalEffect,
        now: DateTime<Utc>,
    ) -> Result<bool, PrincipalError> {
        match effect {
            ApprovalEffect::None => Ok(false),
            ApprovalEffect::MarkFeePaid { amount } => {
                let student = self.student_mut()?;
                student.fee.fee_paid = true;
                student.fee.fee_amount = Some(*amount);
                student.fee.payment_date = Some(now);
                self.updated_at = now;
                Ok(true)
            }
            ApprovalEffect::ActivateMembership => {
                let actual = self.role();
                let member = match &mut self.profile {
                    RoleProfile::Member(p) => p,
                    _ => {
                        return Err(PrincipalError::WrongRole {
                            expected: Role::Member,
                            actual,
                        })
                    }
                };
                if !member.membership.active {
                    member.membership.active = true;
                    member.membership.activated_at = Some(now);
                }
                self.updated_at = now;
                Ok(true)
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
