//! # Payment Verification Lifecycle
//!
//! A payment transaction is a claim that money was paid outside the system
//! (bank transfer, UPI). It is recorded `Pending` and resolved exactly once
//! by an admin.
//!
//! ## States
//!
//! ```text
//! Pending ──approve──▶ Approved (terminal)
//!    │
//!    └─────reject───▶ Rejected (terminal)
//! ```
//!
//! Status is monotonic. A second resolution attempt fails with
//! [`TransactionError::AlreadyResolved`] whatever the requested outcome.
//!
//! ## Linkage
//!
//! A claim submitted by an authenticated principal carries an explicit
//! [`PrincipalLink`]. Anonymous claims are unlinked until an admin attaches
//! them. The fuzzy claimant match in [`TransactionFilter`] exists for
//! finding those unlinked claims.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use campus_core::error::require_field;
use campus_core::{Email, PrincipalId, Role, TransactionId, ValidationError};

// ─── Payment Type & Status ───────────────────────────────────────────

/// What a payment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// Student course or exam fee.
    Fee,
    /// Donation.
    Donation,
    /// Membership subscription.
    Membership,
    /// Anything else.
    General,
}

impl PaymentType {
    /// Every payment type.
    pub const ALL: [PaymentType; 4] = [Self::Fee, Self::Donation, Self::Membership, Self::General];

    /// Lowercase name, as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fee => "fee",
            Self::Donation => "donation",
            Self::Membership => "membership",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "payment_type",
                reason: format!("unknown payment type \"{s}\""),
            })
    }
}

/// Verification status of a payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting admin review.
    Pending,
    /// Verified by an admin (terminal).
    Approved,
    /// Refused by an admin (terminal).
    Rejected,
}

impl PaymentStatus {
    /// Every status.
    pub const ALL: [PaymentStatus; 3] = [Self::Pending, Self::Approved, Self::Rejected];

    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Lowercase name, as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "status",
                reason: format!("unknown status \"{s}\""),
            })
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors from transaction lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// The transaction has already been approved or rejected.
    #[error("transaction is already {status}")]
    AlreadyResolved {
        /// The terminal status it holds.
        status: PaymentStatus,
    },

    /// The transaction is already linked to a principal.
    #[error("transaction is already linked to a principal")]
    AlreadyLinked,
}

// ─── Approval Effect ─────────────────────────────────────────────────

/// The principal-side consequence of approving a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ApprovalEffect {
    /// Mark the student's fee paid with the approved amount.
    MarkFeePaid {
        /// Amount approved.
        amount: i64,
    },
    /// Activate the member's membership.
    ActivateMembership,
    /// No principal change.
    None,
}

impl ApprovalEffect {
    /// The effect implied by a payment of `payment_type` for `amount`.
    pub fn for_payment(payment_type: PaymentType, amount: i64) -> Self {
        match payment_type {
            PaymentType::Fee => Self::MarkFeePaid { amount },
            PaymentType::Membership => Self::ActivateMembership,
            PaymentType::Donation | PaymentType::General => Self::None,
        }
    }

    /// The role able to receive this effect, if any.
    pub fn target_role(&self) -> Option<Role> {
        match self {
            Self::MarkFeePaid { .. } => Some(Role::Student),
            Self::ActivateMembership => Some(Role::Member),
            Self::None => None,
        }
    }
}

// ─── Claim Input ─────────────────────────────────────────────────────

/// Who says they paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claimant {
    /// Claimant name.
    pub name: String,
    /// Contact email.
    pub email: Option<Email>,
    /// Contact phone.
    pub phone: Option<String>,
}

/// The principal a transaction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalLink {
    /// Principal id.
    pub principal_id: PrincipalId,
    /// Role of that principal at link time.
    pub role: Role,
}

/// Raw payment claim, as submitted.
#[derive(Debug, Clone)]
pub struct PaymentClaim {
    /// What the payment is for.
    pub payment_type: PaymentType,
    /// Claimant name.
    pub name: String,
    /// Claimant email.
    pub email: Option<String>,
    /// Claimant phone.
    pub phone: Option<String>,
    /// Amount in whole currency units.
    pub amount: i64,
    /// External transaction reference (UTR / bank reference).
    pub external_id: String,
    /// Free-text purpose.
    pub purpose: Option<String>,
}

// ─── Transaction ─────────────────────────────────────────────────────

/// A recorded payment claim and its verification outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Unique identifier.
    pub id: TransactionId,
    /// What the payment is for.
    pub payment_type: PaymentType,
    /// Who claims to have paid.
    pub claimant: Claimant,
    /// Amount, always positive.
    pub amount: i64,
    /// External transaction reference.
    pub external_id: String,
    /// Free-text purpose.
    pub purpose: Option<String>,
    /// Verification status.
    pub status: PaymentStatus,
    /// Owning principal, if known.
    pub link: Option<PrincipalLink>,
    /// When the claim was recorded.
    pub created_at: DateTime<Utc>,
    /// When the claim was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Admin who resolved the claim.
    pub resolved_by: Option<PrincipalId>,
    /// Reason given on rejection.
    pub rejection_reason: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl PaymentTransaction {
    /// Validate a claim and record it as `Pending`.
    ///
    /// Requires a positive amount, a non-blank external id, a non-blank
    /// claimant name, and at least one of email or phone.
    pub fn record(
        claim: PaymentClaim,
        link: Option<PrincipalLink>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if claim.amount <= 0 {
            return Err(ValidationError::NonPositiveAmount { field: "amount" });
        }
        let external_id = require_field(Some(&claim.external_id), "transaction_id")?;
        let name = require_field(Some(&claim.name), "name")?;
        let email = non_blank(claim.email).map(Email::new).transpose()?;
        let phone = non_blank(claim.phone);
        if email.is_none() && phone.is_none() {
            return Err(ValidationError::MissingField { field: "email" });
        }

        Ok(Self {
            id: TransactionId::new(),
            payment_type: claim.payment_type,
            claimant: Claimant { name, email, phone },
            amount: claim.amount,
            external_id,
            purpose: non_blank(claim.purpose),
            status: PaymentStatus::Pending,
            link,
            created_at: now,
            resolved_at: None,
            resolved_by: None,
            rejection_reason: None,
        })
    }

    /// Approve (PENDING → APPROVED), returning the effect to apply to the
    /// linked principal.
    pub fn approve(
        &mut self,
        admin: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<ApprovalEffect, TransactionError> {
        self.require_pending()?;
        self.resolve(PaymentStatus::Approved, admin, now);
        Ok(ApprovalEffect::for_payment(self.payment_type, self.amount))
    }

    /// Reject (PENDING → REJECTED).
    pub fn reject(
        &mut self,
        admin: PrincipalId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransactionError> {
        self.require_pending()?;
        self.rejection_reason = non_blank(reason);
        self.resolve(PaymentStatus::Rejected, admin, now);
        Ok(())
    }

    /// Link an unlinked transaction to a principal.
    ///
    /// Allowed in any status. An approval recorded while unlinked had no
    /// principal to act on, so attaching an `Approved` transaction returns
    /// its effect for the caller to apply now. Pending and rejected
    /// transactions return [`ApprovalEffect::None`].
    pub fn attach(&mut self, link: PrincipalLink) -> Result<ApprovalEffect, TransactionError> {
        if self.link.is_some() {
            return Err(TransactionError::AlreadyLinked);
        }
        self.link = Some(link);
        Ok(match self.status {
            PaymentStatus::Approved => ApprovalEffect::for_payment(self.payment_type, self.amount),
            PaymentStatus::Pending | PaymentStatus::Rejected => ApprovalEffect::None,
        })
    }

    /// Whether the transaction is linked to `principal`.
    pub fn is_linked_to(&self, principal: PrincipalId) -> bool {
        self.link.is_some_and(|l| l.principal_id == principal)
    }

    /// Whether the transaction passes every criterion of `filter`.
    pub fn matches(&self, filter: &TransactionFilter) -> bool {
        if filter.status.is_some_and(|s| s != self.status) {
            return false;
        }
        if filter.payment_type.is_some_and(|t| t != self.payment_type) {
            return false;
        }
        if let Some(principal) = filter.principal_id {
            if !self.is_linked_to(principal) {
                return false;
            }
        }
        if filter.unlinked && self.link.is_some() {
            return false;
        }
        if let Some(needle) = filter.claimant.as_deref().map(str::trim) {
            if !needle.is_empty() {
                let needle = needle.to_lowercase();
                let name_hit = self.claimant.name.to_lowercase().contains(&needle);
                let email_hit = self
                    .claimant
                    .email
                    .as_ref()
                    .is_some_and(|e| e.as_str().contains(&needle));
                if !name_hit && !email_hit {
                    return false;
                }
            }
        }
        true
    }

    fn require_pending(&self) -> Result<(), TransactionError> {
        if self.status.is_terminal() {
            return Err(TransactionError::AlreadyResolved {
                status: self.status,
            });
        }
        Ok(())
    }

    fn resolve(&mut self, to: PaymentStatus, admin: PrincipalId, now: DateTime<Utc>) {
        self.status = to;
        self.resolved_at = Some(now);
        self.resolved_by = Some(admin);
    }
}

/// Criteria for listing transactions. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    /// Only this status.
    pub status: Option<PaymentStatus>,
    /// Only this payment type.
    pub payment_type: Option<PaymentType>,
    /// Only transactions linked to this principal.
    pub principal_id: Option<PrincipalId>,
    /// Only unlinked transactions.
    pub unlinked: bool,
    /// Case-insensitive substring of claimant name or email.
    pub claimant: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(payment_type: PaymentType) -> PaymentClaim {
        PaymentClaim {
            payment_type,
            name: "Ravi Kumar".to_string(),
            email: Some("Ravi@Example.com".to_string()),
            phone: None,
            amount: 500,
            external_id: "UTR123456".to_string(),
            purpose: Some("Exam fee".to_string()),
        }
    }

    fn pending(payment_type: PaymentType) -> PaymentTransaction {
        PaymentTransaction::record(claim(payment_type), None, Utc::now()).unwrap()
    }

    #[test]
    fn test_record_is_pending_and_unlinked() {
        let tx = pending(PaymentType::Fee);
        assert_eq!(tx.status, PaymentStatus::Pending);
        assert!(tx.link.is_none());
        assert_eq!(tx.claimant.email.as_ref().unwrap().as_str(), "ravi@example.com");
    }

    #[test]
    fn test_record_rejects_non_positive_amount() {
        let mut c = claim(PaymentType::Fee);
        c.amount = 0;
        assert_eq!(
            PaymentTransaction::record(c, None, Utc::now()).unwrap_err(),
            ValidationError::NonPositiveAmount { field: "amount" }
        );
    }

    #[test]
    fn test_record_requires_external_id() {
        let mut c = claim(PaymentType::Donation);
        c.external_id = "  ".into();
        assert_eq!(
            PaymentTransaction::record(c, None, Utc::now()).unwrap_err(),
            ValidationError::MissingField {
                field: "transaction_id"
            }
        );
    }

    #[test]
    fn test_record_requires_a_contact() {
        let mut c = claim(PaymentType::General);
        c.email = None;
        c.phone = Some(" ".into());
        assert!(PaymentTransaction::record(c.clone(), None, Utc::now()).is_err());
        c.phone = Some("9876543210".into());
        assert!(PaymentTransaction::record(c, None, Utc::now()).is_ok());
    }

    #[test]
    fn test_record_rejects_malformed_claimant_email() {
        let mut c = claim(PaymentType::Fee);
        c.email = Some("nope".into());
        assert!(matches!(
            PaymentTransaction::record(c, None, Utc::now()),
            Err(ValidationError::InvalidEmail(_))
        ));
    }

    #[test]
    fn test_pending_to_approved() {
        let mut tx = pending(PaymentType::Fee);
        let admin = PrincipalId::new();
        let effect = tx.approve(admin, Utc::now()).unwrap();
        assert_eq!(tx.status, PaymentStatus::Approved);
        assert_eq!(tx.resolved_by, Some(admin));
        assert!(tx.resolved_at.is_some());
        assert_eq!(effect, ApprovalEffect::MarkFeePaid { amount: 500 });
    }

    #[test]
    fn test_pending_to_rejected_with_reason() {
        let mut tx = pending(PaymentType::Membership);
        tx.reject(PrincipalId::new(), Some("UTR not found".into()), Utc::now())
            .unwrap();
        assert_eq!(tx.status, PaymentStatus::Rejected);
        assert_eq!(tx.rejection_reason.as_deref(), Some("UTR not found"));
    }

    #[test]
    fn test_cannot_approve_twice() {
        let mut tx = pending(PaymentType::Fee);
        tx.approve(PrincipalId::new(), Utc::now()).unwrap();
        assert_eq!(
            tx.approve(PrincipalId::new(), Utc::now()),
            Err(TransactionError::AlreadyResolved {
                status: PaymentStatus::Approved
            })
        );
    }

    #[test]
    fn test_cannot_reject_after_approval() {
        let mut tx = pending(PaymentType::Fee);
        tx.approve(PrincipalId::new(), Utc::now()).unwrap();
        assert!(matches!(
            tx.reject(PrincipalId::new(), None, Utc::now()),
            Err(TransactionError::AlreadyResolved { .. })
        ));
        assert_eq!(tx.status, PaymentStatus::Approved);
    }

    #[test]
    fn test_cannot_approve_after_rejection() {
        let mut tx = pending(PaymentType::Donation);
        tx.reject(PrincipalId::new(), None, Utc::now()).unwrap();
        assert!(tx.approve(PrincipalId::new(), Utc::now()).is_err());
        assert_eq!(tx.status, PaymentStatus::Rejected);
    }

    #[test]
    fn test_effects_by_type() {
        assert_eq!(
            ApprovalEffect::for_payment(PaymentType::Membership, 10),
            ApprovalEffect::ActivateMembership
        );
        assert_eq!(
            ApprovalEffect::for_payment(PaymentType::Donation, 10),
            ApprovalEffect::None
        );
        assert_eq!(
            ApprovalEffect::for_payment(PaymentType::General, 10).target_role(),
            None
        );
        assert_eq!(
            ApprovalEffect::for_payment(PaymentType::Fee, 10).target_role(),
            Some(Role::Student)
        );
    }

    #[test]
    fn test_attach_once() {
        let mut tx = pending(PaymentType::Fee);
        let link = PrincipalLink {
            principal_id: PrincipalId::new(),
            role: Role::Student,
        };
        assert_eq!(tx.attach(link), Ok(ApprovalEffect::None));
        assert!(tx.is_linked_to(link.principal_id));
        assert_eq!(tx.attach(link), Err(TransactionError::AlreadyLinked));
    }

    #[test]
    fn test_attach_after_approval_hands_back_effect() {
        let mut fee = pending(PaymentType::Fee);
        fee.approve(PrincipalId::new(), Utc::now()).unwrap();
        let effect = fee
            .attach(PrincipalLink {
                principal_id: PrincipalId::new(),
                role: Role::Student,
            })
            .unwrap();
        assert_eq!(effect, ApprovalEffect::for_payment(PaymentType::Fee, fee.amount));

        let mut rejected = pending(PaymentType::Membership);
        rejected.reject(PrincipalId::new(), None, Utc::now()).unwrap();
        let effect = rejected
            .attach(PrincipalLink {
                principal_id: PrincipalId::new(),
                role: Role::Member,
            })
            .unwrap();
        assert_eq!(effect, ApprovalEffect::None);
    }

    #[test]
    fn test_filter_by_status_and_type() {
        let tx = pending(PaymentType::Fee);
        assert!(tx.matches(&TransactionFilter::default()));
        assert!(tx.matches(&TransactionFilter {
            status: Some(PaymentStatus::Pending),
            payment_type: Some(PaymentType::Fee),
            ..Default::default()
        }));
        assert!(!tx.matches(&TransactionFilter {
            status: Some(PaymentStatus::Approved),
            ..Default::default()
        }));
    }

    #[test]
    fn test_filter_fuzzy_claimant_is_case_insensitive() {
        let tx = pending(PaymentType::Fee);
        let by = |needle: &str| TransactionFilter {
            claimant: Some(needle.to_string()),
            ..Default::default()
        };
        assert!(tx.matches(&by("RAVI")));
        assert!(tx.matches(&by("example.com")));
        assert!(!tx.matches(&by("priya")));
    }

    #[test]
    fn test_filter_unlinked_and_principal() {
        let mut tx = pending(PaymentType::Fee);
        let unlinked = TransactionFilter {
            unlinked: true,
            ..Default::default()
        };
        assert!(tx.matches(&unlinked));
        let owner = PrincipalId::new();
        tx.attach(PrincipalLink {
            principal_id: owner,
            role: Role::Student,
        })
        .unwrap();
        assert!(!tx.matches(&unlinked));
        assert!(tx.matches(&TransactionFilter {
            principal_id: Some(owner),
            ..Default::default()
        }));
    }

    #[test]
    fn test_status_parse_and_display() {
        assert_eq!("APPROVED".parse::<PaymentStatus>().unwrap(), PaymentStatus::Approved);
        assert_eq!(PaymentStatus::Rejected.to_string(), "rejected");
        assert!("done".parse::<PaymentStatus>().is_err());
        assert_eq!("membership".parse::<PaymentType>().unwrap(), PaymentType::Membership);
    }
}
