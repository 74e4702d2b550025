//! # Verification Workflow
//!
//! Admin resolution of payment transactions. Approval is a compare-and-set
//! on the ledger entry, and the resulting [`ApprovalEffect`] is applied to
//! the linked principal inside the same ledger critical section. With a
//! database configured, both writes go in one Postgres transaction.
//!
//! Approval of an unlinked transaction, or of one whose linked role cannot
//! receive the effect, succeeds without touching any principal. An unlinked
//! approval's effect is applied later, when [`crate::ledger::attach`] links
//! the transaction.

use campus_core::{PrincipalId, TransactionId};
use campus_state::{ApprovalEffect, PaymentTransaction, Principal, TransactionError};
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::state::AppState;

/// Approve a pending transaction and apply its effect.
pub async fn approve(
    state: &AppState,
    id: TransactionId,
    admin: PrincipalId,
) -> Result<PaymentTransaction, AppError> {
    let now = Utc::now();
    let (tx, principal) = state
        .ledger
        .try_update(&id, |tx| {
            let effect = tx.approve(admin, now)?;
            let principal = apply_effect(state, tx, &effect, now);
            Ok::<_, TransactionError>((tx.clone(), principal))
        })
        .ok_or_else(|| AppError::NotFound(format!("transaction {id} not found")))??;

    persist_resolution(state, &tx, principal.as_ref()).await?;

    tracing::info!(
        transaction_id = %id,
        admin_id = %admin,
        payment_type = %tx.payment_type,
        principal_updated = principal.is_some(),
        "payment transaction approved"
    );
    Ok(tx)
}

/// Reject a pending transaction. The principal is unaffected.
pub async fn reject(
    state: &AppState,
    id: TransactionId,
    admin: PrincipalId,
    reason: Option<String>,
) -> Result<PaymentTransaction, AppError> {
    let now = Utc::now();
    let tx = state
        .ledger
        .try_update(&id, |tx| {
            tx.reject(admin, reason, now)?;
            Ok::<_, TransactionError>(tx.clone())
        })
        .ok_or_else(|| AppError::NotFound(format!("transaction {id} not found")))??;

    persist_resolution(state, &tx, None).await?;

    tracing::info!(transaction_id = %id, admin_id = %admin, "payment transaction rejected");
    Ok(tx)
}

/// Apply `effect` to the principal linked to `tx`. Runs under the ledger
/// write lock; takes the principal lock second.
pub(crate) fn apply_effect(
    state: &AppState,
    tx: &PaymentTransaction,
    effect: &ApprovalEffect,
    now: DateTime<Utc>,
) -> Option<Principal> {
    let target_role = effect.target_role()?;
    let Some(link) = tx.link else {
        tracing::info!(
            transaction_id = %tx.id,
            payment_type = %tx.payment_type,
            "approved unlinked transaction, no principal effect applied"
        );
        return None;
    };
    if link.role != target_role {
        tracing::warn!(
            transaction_id = %tx.id,
            principal_id = %link.principal_id,
            linked_role = %link.role,
            expected_role = %target_role,
            "linked principal cannot receive approval effect, skipping"
        );
        return None;
    }

    match state.principals.try_update(&link.principal_id, |p| {
        p.apply_approval_effect(effect, now).map(|_| p.clone())
    }) {
        Some(Ok(principal)) => Some(principal),
        Some(Err(e)) => {
            tracing::warn!(
                transaction_id = %tx.id,
                principal_id = %link.principal_id,
                error = %e,
                "approval effect rejected by principal"
            );
            None
        }
        None => {
            tracing::warn!(
                transaction_id = %tx.id,
                principal_id = %link.principal_id,
                "linked principal not found, no effect applied"
            );
            None
        }
    }
}

async fn persist_resolution(
    state: &AppState,
    tx: &PaymentTransaction,
    principal: Option<&Principal>,
) -> Result<(), AppError> {
    let Some(pool) = &state.db_pool else {
        return Ok(());
    };
    match crate::db::transactions::resolve(pool, tx, principal).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::error!(transaction_id = %tx.id, "transaction was not pending in database");
            Err(AppError::Internal(
                "transaction resolved in-memory but database row was not pending".into(),
            ))
        }
        Err(e) => {
            tracing::error!(transaction_id = %tx.id, error = %e, "failed to persist transaction resolution");
            Err(AppError::Internal(
                "transaction resolved in-memory but database persist failed".into(),
            ))
        }
    }
}
