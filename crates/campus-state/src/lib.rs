//! # campus-state — Domain Models and State Machines
//!
//! Pure domain logic for the campus portal. Nothing in this crate performs
//! I/O or holds locks; storage, concurrency and persistence live in
//! `campus-api`.
//!
//! ## Models
//!
//! - **Principal** (`principal.rs`): a tagged union over the four roles.
//!   Shared identity fields plus a [`RoleProfile`] carrying role-specific
//!   status (student fee and roll number, volunteer approval, member
//!   activation). Admin mutations are methods that check the role first.
//!
//! - **Payment transaction** (`transaction.rs`): the verification lifecycle
//!
//!   ```text
//!   Pending ──▶ Approved (terminal)
//!      │
//!      └─────▶ Rejected (terminal)
//!   ```
//!
//!   Approving yields an [`ApprovalEffect`] derived from the payment type,
//!   which the caller applies to the linked principal in the same critical
//!   section.
//!
//! - **Artifact** (`artifact.rs`): admit cards, membership cards and identity
//!   cards, with the eligibility gate that decides whether a principal may
//!   be issued one and the uniqueness key `(principal, kind, context)`.

pub mod artifact;
pub mod principal;
pub mod transaction;

pub use artifact::{
    can_generate, Artifact, ArtifactError, ArtifactKey, ArtifactKind, ArtifactParams,
    CardParams, EligibilityError, ExamParams,
};
pub use principal::{
    AdminProfile, FeeStatus, MemberProfile, MembershipStatus, Principal, PrincipalDetails,
    PrincipalError, Registration, RoleProfile, StudentProfile, ValidatedRegistration,
    VolunteerProfile,
};
pub use transaction::{
    ApprovalEffect, Claimant, PaymentClaim, PaymentStatus, PaymentTransaction, PaymentType,
    PrincipalLink, TransactionError, TransactionFilter,
};
