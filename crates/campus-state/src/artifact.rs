//! # Generated Artifacts and Eligibility
//!
//! Admit cards, membership cards and identity cards are generated by an
//! admin for a single principal. Whether a principal may receive one is
//! decided by [`can_generate`]:
//!
//! | Kind | Requires |
//! |---|---|
//! | admit card | student with a roll number |
//! | membership card | member with an active membership |
//! | identity card | active member, or approved and active volunteer |
//!
//! At most one artifact exists per [`ArtifactKey`] `(principal, kind,
//! context)`. The context is the normalized exam name for admit cards and
//! the validity window label for cards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use campus_core::error::require_field;
use campus_core::{ArtifactId, PrincipalId, Role, ValidationError};

use crate::principal::{Principal, RoleProfile};

/// Kind of generated artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Exam admit card.
    AdmitCard,
    /// Membership card.
    MembershipCard,
    /// Identity card.
    IdentityCard,
}

impl ArtifactKind {
    /// Every kind.
    pub const ALL: [ArtifactKind; 3] = [Self::AdmitCard, Self::MembershipCard, Self::IdentityCard];

    /// Snake-case name, as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdmitCard => "admit_card",
            Self::MembershipCard => "membership_card",
            Self::IdentityCard => "identity_card",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "kind",
                reason: format!("unknown artifact kind \"{s}\""),
            })
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Why a principal may not receive an artifact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EligibilityError {
    /// The kind is never issued to this role.
    #[error("{kind} cannot be issued to a {role}")]
    WrongRole {
        /// Requested kind.
        kind: ArtifactKind,
        /// Principal's role.
        role: Role,
    },
    /// Student has no roll number yet.
    #[error("student has no roll number assigned")]
    MissingRollNumber,
    /// Member's membership is not active.
    #[error("membership is not active")]
    MembershipInactive,
    /// Volunteer is not approved.
    #[error("volunteer is not approved")]
    VolunteerNotApproved,
    /// Volunteer is approved but inactive.
    #[error("volunteer is not active")]
    VolunteerInactive,
}

/// Errors from artifact generation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    /// The principal fails the gate.
    #[error("not eligible: {0}")]
    Ineligible(#[from] EligibilityError),
    /// Parameters are invalid or do not fit the kind.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// An artifact with the same key exists.
    #[error("{kind} already exists for this principal and context")]
    AlreadyExists {
        /// Kind of the existing artifact.
        kind: ArtifactKind,
    },
}

// ─── Gate ────────────────────────────────────────────────────────────

/// Decide whether `principal` may receive an artifact of `kind`.
pub fn can_generate(principal: &Principal, kind: ArtifactKind) -> Result<(), EligibilityError> {
    let wrong_role = || EligibilityError::WrongRole {
        kind,
        role: principal.role(),
    };
    match (kind, &principal.profile) {
        (ArtifactKind::AdmitCard, RoleProfile::Student(s)) => {
            if s.roll_number.is_some() {
                Ok(())
            } else {
                Err(EligibilityError::MissingRollNumber)
            }
        }
        (ArtifactKind::MembershipCard | ArtifactKind::IdentityCard, RoleProfile::Member(m)) => {
            if m.membership.active {
                Ok(())
            } else {
                Err(EligibilityError::MembershipInactive)
            }
        }
        (ArtifactKind::IdentityCard, RoleProfile::Volunteer(v)) => {
            if !v.is_approved {
                Err(EligibilityError::VolunteerNotApproved)
            } else if !v.is_active {
                Err(EligibilityError::VolunteerInactive)
            } else {
                Ok(())
            }
        }
        _ => Err(wrong_role()),
    }
}

// ─── Parameters ──────────────────────────────────────────────────────

/// Exam details printed on an admit card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamParams {
    /// Exam name; its normalized form is the uniqueness context.
    pub exam_name: String,
    /// Exam date.
    pub exam_date: NaiveDate,
    /// Reporting time, free text.
    pub exam_time: Option<String>,
    /// Exam centre.
    pub exam_center: String,
}

/// Validity window printed on a membership or identity card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardParams {
    /// First valid day.
    pub valid_from: NaiveDate,
    /// Last valid day.
    pub valid_until: NaiveDate,
}

/// Kind-specific generation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactParams {
    /// Admit card parameters.
    Exam(ExamParams),
    /// Card parameters.
    Card(CardParams),
}

/// Normalize an exam name for use as a uniqueness context: trimmed,
/// lowercased, inner whitespace collapsed.
pub fn normalize_exam_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl ArtifactParams {
    /// Validate the parameters for `kind` and return the context key.
    pub fn context_for(&self, kind: ArtifactKind) -> Result<String, ValidationError> {
        match (kind, self) {
            (ArtifactKind::AdmitCard, Self::Exam(exam)) => {
                let name = require_field(Some(&exam.exam_name), "exam_name")?;
                require_field(Some(&exam.exam_center), "exam_center")?;
                Ok(normalize_exam_name(&name))
            }
            (ArtifactKind::MembershipCard | ArtifactKind::IdentityCard, Self::Card(card)) => {
                if card.valid_until < card.valid_from {
                    return Err(ValidationError::InvalidValue {
                        field: "valid_until",
                        reason: "must not be before valid_from".to_string(),
                    });
                }
                Ok(format!("{}/{}", card.valid_from, card.valid_until))
            }
            (ArtifactKind::AdmitCard, _) => Err(ValidationError::MissingField {
                field: "exam_name",
            }),
            (_, _) => Err(ValidationError::MissingField {
                field: "valid_from",
            }),
        }
    }
}

// ─── Artifact ────────────────────────────────────────────────────────

/// Uniqueness key of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    /// Holder.
    pub principal_id: PrincipalId,
    /// Kind.
    pub kind: ArtifactKind,
    /// Normalized context.
    pub context_key: String,
}

/// A generated admit card, membership card or identity card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Unique identifier.
    pub id: ArtifactId,
    /// Kind.
    pub kind: ArtifactKind,
    /// Holder.
    pub principal_id: PrincipalId,
    /// Normalized context (exam name or validity window).
    pub context_key: String,
    /// Printed parameters.
    pub params: ArtifactParams,
    /// Number printed on the card.
    pub card_number: String,
    /// Photo reference in external blob storage.
    pub photo_ref: Option<String>,
    /// When it was generated.
    pub generated_at: DateTime<Utc>,
    /// Admin who generated it.
    pub generated_by: PrincipalId,
}

impl Artifact {
    /// Check the gate and parameters and build an artifact for `principal`.
    ///
    /// Does not check uniqueness.
    pub fn generate(
        principal: &Principal,
        kind: ArtifactKind,
        params: ArtifactParams,
        photo_ref: Option<String>,
        admin: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<Self, ArtifactError> {
        let context_key = params.context_for(kind)?;
        can_generate(principal, kind)?;

        let card_number = match (kind, &principal.profile) {
            (ArtifactKind::AdmitCard, RoleProfile::Student(s)) => {
                s.roll_number.clone().unwrap_or_default()
            }
            _ => principal.identifier().to_string(),
        };

        Ok(Self {
            id: ArtifactId::new(),
            kind,
            principal_id: principal.id,
            context_key,
            params,
            card_number,
            photo_ref: photo_ref
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            generated_at: now,
            generated_by: admin,
        })
    }

    /// The uniqueness key.
    pub fn key(&self) -> ArtifactKey {
        ArtifactKey {
            principal_id: self.principal_id,
            kind: self.kind,
            context_key: self.context_key.clone(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
