//! # Transaction Ledger
//!
//! Records payment claims and answers listing queries. Resolution lives in
//! [`crate::verification`].
//!
//! Duplicate external references are accepted; listings flag every
//! transaction whose reference appears more than once in the ledger.

use std::collections::HashMap;

use campus_core::{PrincipalId, TransactionId};
use campus_state::{PaymentClaim, PaymentTransaction, PrincipalLink, TransactionError, TransactionFilter};
use chrono::Utc;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;
use crate::verification;

/// A listed transaction with its duplicate-reference flag.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    /// The transaction as stored.
    pub transaction: PaymentTransaction,
    /// Another transaction in the ledger carries the same external reference.
    pub duplicate_external_id: bool,
}

/// Record a claim as pending, linked to the caller when authenticated.
pub async fn record(
    state: &AppState,
    claim: PaymentClaim,
    caller: Option<CallerIdentity>,
) -> Result<PaymentTransaction, AppError> {
    let link = caller.map(|c| PrincipalLink {
        principal_id: c.principal_id,
        role: c.role,
    });
    let tx = PaymentTransaction::record(claim, link, Utc::now())?;
    state.ledger.insert(tx.id, tx.clone());

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::transactions::insert(pool, &tx).await {
            state.ledger.remove(&tx.id);
            tracing::error!(transaction_id = %tx.id, error = %e, "failed to persist payment transaction");
            return Err(AppError::Internal(
                "payment transaction database persist failed".into(),
            ));
        }
    }

    tracing::info!(
        transaction_id = %tx.id,
        payment_type = %tx.payment_type,
        amount = tx.amount,
        linked = tx.link.is_some(),
        "payment claim recorded"
    );
    Ok(tx)
}

/// Transactions matching `filter`, newest first.
pub fn list_for(state: &AppState, filter: &TransactionFilter) -> Vec<LedgerEntry> {
    let all = state.ledger.list();
    let mut reference_counts: HashMap<&str, usize> = HashMap::new();
    for tx in &all {
        *reference_counts.entry(tx.external_id.as_str()).or_insert(0) += 1;
    }

    let mut entries: Vec<LedgerEntry> = all
        .iter()
        .filter(|tx| tx.matches(filter))
        .map(|tx| LedgerEntry {
            transaction: tx.clone(),
            duplicate_external_id: reference_counts
                .get(tx.external_id.as_str())
                .is_some_and(|n| *n > 1),
        })
        .collect();
    entries.sort_by(|a, b| {
        b.transaction
            .created_at
            .cmp(&a.transaction.created_at)
            .then_with(|| b.transaction.id.cmp(&a.transaction.id))
    });
    entries
}

/// Whether another transaction carries the same external reference.
pub fn has_duplicate_reference(state: &AppState, tx: &PaymentTransaction) -> bool {
    state
        .ledger
        .list()
        .iter()
        .any(|other| other.id != tx.id && other.external_id == tx.external_id)
}

/// Transactions linked to the caller, newest first.
pub fn list_own(state: &AppState, caller: &CallerIdentity) -> Vec<LedgerEntry> {
    list_for(
        state,
        &TransactionFilter {
            principal_id: Some(caller.principal_id),
            ..TransactionFilter::default()
        },
    )
}

/// Link an unlinked transaction to an existing principal.
///
/// Attaching an already-approved transaction applies its approval effect
/// in the same ledger critical section, and both writes are persisted
/// together.
pub async fn attach(
    state: &AppState,
    id: TransactionId,
    principal_id: PrincipalId,
    admin: PrincipalId,
) -> Result<PaymentTransaction, AppError> {
    let principal = state
        .principals
        .get(&principal_id)
        .ok_or_else(|| AppError::NotFound(format!("principal {principal_id} not found")))?;
    let link = PrincipalLink {
        principal_id,
        role: principal.role(),
    };

    let now = Utc::now();
    let (tx, updated) = state
        .ledger
        .try_update(&id, |tx| {
            let effect = tx.attach(link)?;
            let at = tx.resolved_at.unwrap_or(now);
            let updated = verification::apply_effect(state, tx, &effect, at);
            Ok::<_, TransactionError>((tx.clone(), updated))
        })
        .ok_or_else(|| AppError::NotFound(format!("transaction {id} not found")))??;

    if let Some(pool) = &state.db_pool {
        match crate::db::transactions::attach(pool, id, link, updated.as_ref()).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!(transaction_id = %id, "transaction was already linked in database");
                return Err(AppError::Internal(
                    "transaction linked in-memory but database row was already linked".into(),
                ));
            }
            Err(e) => {
                tracing::error!(transaction_id = %id, error = %e, "failed to persist transaction link");
                return Err(AppError::Internal(
                    "transaction linked in-memory but database persist failed".into(),
                ));
            }
        }
    }

    tracing::info!(
        transaction_id = %id,
        principal_id = %principal_id,
        admin_id = %admin,
        status = %tx.status,
        principal_updated = updated.is_some(),
        "transaction attached to principal"
    );
    Ok(tx)
}
