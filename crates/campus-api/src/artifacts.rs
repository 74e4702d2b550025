//! # Artifact Issuance
//!
//! Admin generation of admit cards, membership cards and identity cards,
//! single and bulk, plus the holder's own lookups. Eligibility and
//! parameter checks live in [`campus_state::artifact`]; uniqueness is
//! enforced by [`crate::state::ArtifactRegistry::insert_unique`].

use campus_core::{PrincipalId, Role};
use campus_state::{
    can_generate, Artifact, ArtifactKey, ArtifactKind, ArtifactParams, ExamParams, Principal,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{require_self, CallerIdentity};
use crate::error::AppError;
use crate::state::AppState;

/// Class filter value selecting every student.
pub const ALL_CLASSES: &str = "all";

/// One student the bulk run could not generate for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkFailure {
    /// Student the card was not generated for.
    #[schema(value_type = String, format = Uuid)]
    pub principal_id: PrincipalId,
    /// The student's sequential identifier.
    pub identifier: String,
    /// Why generation failed.
    pub reason: String,
}

/// Outcome of a bulk admit-card run.
///
/// `generated + failed` is the number of students processed. Students
/// already holding a card for the exam are `skipped`; students without a
/// roll number are counted as `ineligible` and not processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BulkOutcome {
    /// Cards generated by this run.
    pub generated: usize,
    /// Eligible students whose generation failed.
    pub failed: usize,
    /// Students that already held a card for the exam.
    pub skipped: usize,
    /// Students without a roll number.
    pub ineligible: usize,
    /// One entry per failed student.
    pub failures: Vec<BulkFailure>,
}

/// Generate one artifact for a principal.
pub async fn generate(
    state: &AppState,
    principal_id: PrincipalId,
    kind: ArtifactKind,
    params: ArtifactParams,
    photo_ref: Option<String>,
    admin: PrincipalId,
) -> Result<Artifact, AppError> {
    let principal = state
        .principals
        .get(&principal_id)
        .ok_or_else(|| AppError::NotFound(format!("principal {principal_id} not found")))?;
    let artifact = issue(state, &principal, kind, params, photo_ref, admin).await?;

    tracing::info!(
        artifact_id = %artifact.id,
        kind = %kind,
        principal_id = %principal_id,
        admin_id = %admin,
        "artifact generated"
    );
    Ok(artifact)
}

/// Generate admit cards for every student in `class_filter` (or
/// [`ALL_CLASSES`]), in registration order. Per-student failures are
/// counted and never abort the run.
pub async fn generate_for_class(
    state: &AppState,
    class_filter: &str,
    exam: ExamParams,
    admin: PrincipalId,
) -> Result<BulkOutcome, AppError> {
    let params = ArtifactParams::Exam(exam);
    let context_key = params.context_for(ArtifactKind::AdmitCard)?;
    let filter = class_filter.trim();
    if filter.is_empty() {
        return Err(AppError::InvalidField {
            field: "class_name",
            message: "class_name must not be empty".to_string(),
        });
    }

    let mut outcome = BulkOutcome::default();
    for student in state.principals.list_role(Role::Student) {
        if !in_class(&student, filter) {
            continue;
        }
        let key = ArtifactKey {
            principal_id: student.id,
            kind: ArtifactKind::AdmitCard,
            context_key: context_key.clone(),
        };
        if state.artifacts.contains_key(&key) {
            outcome.skipped += 1;
            continue;
        }
        if can_generate(&student, ArtifactKind::AdmitCard).is_err() {
            outcome.ineligible += 1;
            continue;
        }

        match issue(state, &student, ArtifactKind::AdmitCard, params.clone(), None, admin).await {
            Ok(_) => outcome.generated += 1,
            Err(e) => {
                tracing::warn!(
                    principal_id = %student.id,
                    error = %e,
                    "bulk admit card generation failed for student"
                );
                outcome.failed += 1;
                outcome.failures.push(BulkFailure {
                    principal_id: student.id,
                    identifier: student.identifier().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        class = %filter,
        exam = %context_key,
        admin_id = %admin,
        generated = outcome.generated,
        failed = outcome.failed,
        skipped = outcome.skipped,
        ineligible = outcome.ineligible,
        "bulk admit card generation finished"
    );
    Ok(outcome)
}

/// The caller's artifacts, newest first.
pub fn list_own(state: &AppState, caller: &CallerIdentity) -> Vec<Artifact> {
    state.artifacts.for_principal(caller.principal_id)
}

/// The caller's most recent artifact of `kind`.
pub fn get_own(
    state: &AppState,
    caller: &CallerIdentity,
    kind: ArtifactKind,
) -> Result<Artifact, AppError> {
    let artifact = list_own(state, caller)
        .into_iter()
        .find(|a| a.kind == kind)
        .ok_or_else(|| AppError::NotFound(format!("no {kind} has been generated")))?;
    require_self(caller, artifact.principal_id)?;
    Ok(artifact)
}

fn in_class(student: &Principal, filter: &str) -> bool {
    if filter.eq_ignore_ascii_case(ALL_CLASSES) {
        return true;
    }
    student
        .as_student()
        .is_some_and(|s| s.class_name.trim().eq_ignore_ascii_case(filter))
}

/// Build, register and persist. A failed database write removes the
/// registry entry again.
async fn issue(
    state: &AppState,
    principal: &Principal,
    kind: ArtifactKind,
    params: ArtifactParams,
    photo_ref: Option<String>,
    admin: PrincipalId,
) -> Result<Artifact, AppError> {
    let artifact = Artifact::generate(principal, kind, params, photo_ref, admin, Utc::now())?;
    state
        .artifacts
        .insert_unique(artifact.clone())
        .map_err(AppError::from)?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::artifacts::insert(pool, &artifact).await {
            state.artifacts.remove(&artifact.id);
            tracing::error!(artifact_id = %artifact.id, error = %e, "failed to persist artifact");
            return Err(AppError::Internal(
                "artifact generated in-memory but database persist failed".into(),
            ));
        }
    }
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use campus_state::{ApprovalEffect, CardParams, Registration};
    use chrono::NaiveDate;

    fn test_state() -> AppState {
        AppState::try_with_config(
            AppConfig {
                hash_memory_kib: 1024,
                hash_iterations: 1,
                ..AppConfig::default()
            },
            None,
        )
        .unwrap()
    }

    async fn register(
        state: &AppState,
        role: Role,
        email: &str,
        class_name: Option<&str>,
    ) -> Principal {
        crate::credentials::register(
            state,
            Registration {
                role,
                email: email.to_string(),
                secret: "s3cret!".to_string(),
                name: "Test Person".to_string(),
                phone: None,
                address: None,
                city: None,
                class_name: class_name.map(str::to_string),
            },
        )
        .await
        .unwrap()
    }

    /// A student with the fee paid and a roll number assigned.
    async fn enrolled(state: &AppState, email: &str, class_name: &str, roll: &str) -> Principal {
        let student = register(state, Role::Student, email, Some(class_name)).await;
        state
            .principals
            .try_update(&student.id, |p| {
                p.apply_approval_effect(&ApprovalEffect::MarkFeePaid { amount: 1500 }, Utc::now())
            })
            .unwrap()
            .unwrap();
        crate::credentials::assign_roll_number(state, student.id, roll)
            .await
            .unwrap()
    }

    fn exam(name: &str) -> ExamParams {
        ExamParams {
            exam_name: name.to_string(),
            exam_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            exam_time: Some("10:00".to_string()),
            exam_center: "Main Hall".to_string(),
        }
    }

    fn card() -> ArtifactParams {
        ArtifactParams::Card(CardParams {
            valid_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            valid_until: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
        })
    }

    #[tokio::test]
    async fn generate_twice_is_a_conflict() {
        let state = test_state();
        let admin = PrincipalId::new();
        let student = enrolled(&state, "s@campus.test", "Class 10", "R-101").await;

        let card = generate(
            &state,
            student.id,
            ArtifactKind::AdmitCard,
            ArtifactParams::Exam(exam("Annual Exam")),
            Some(" photos/s.jpg ".to_string()),
            admin,
        )
        .await
        .unwrap();
        assert_eq!(card.card_number, "R-101");
        assert_eq!(card.context_key, "annual exam");
        assert_eq!(card.photo_ref.as_deref(), Some("photos/s.jpg"));

        let err = generate(
            &state,
            student.id,
            ArtifactKind::AdmitCard,
            ArtifactParams::Exam(exam("  ANNUAL   exam ")),
            None,
            admin,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // A different exam is a different context.
        generate(
            &state,
            student.id,
            ArtifactKind::AdmitCard,
            ArtifactParams::Exam(exam("Half-Yearly")),
            None,
            admin,
        )
        .await
        .unwrap();
        assert_eq!(list_own(&state, &caller(&student)).len(), 2);
    }

    #[tokio::test]
    async fn ineligible_principals_are_rejected() {
        let state = test_state();
        let admin = PrincipalId::new();
        let student = register(&state, Role::Student, "s@campus.test", Some("Class 10")).await;
        let err = generate(
            &state,
            student.id,
            ArtifactKind::AdmitCard,
            ArtifactParams::Exam(exam("Annual Exam")),
            None,
            admin,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let volunteer = register(&state, Role::Volunteer, "v@campus.test", None).await;
        let err = generate(&state, volunteer.id, ArtifactKind::IdentityCard, card(), None, admin)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = generate(&state, PrincipalId::new(), ArtifactKind::IdentityCard, card(), None, admin)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(state.artifacts.count_by_kind().is_empty());
    }

    #[tokio::test]
    async fn approved_volunteer_gets_identity_card() {
        let state = test_state();
        let admin = PrincipalId::new();
        let volunteer = register(&state, Role::Volunteer, "v@campus.test", None).await;
        crate::credentials::approve_volunteer(&state, volunteer.id, admin)
            .await
            .unwrap();

        let icard = generate(&state, volunteer.id, ArtifactKind::IdentityCard, card(), None, admin)
            .await
            .unwrap();
        assert_eq!(icard.card_number, volunteer.identifier());
        let own = get_own(&state, &caller(&volunteer), ArtifactKind::IdentityCard).unwrap();
        assert_eq!(own.id, icard.id);
    }

    #[tokio::test]
    async fn get_own_without_artifact_is_not_found() {
        let state = test_state();
        let member = register(&state, Role::Member, "m@campus.test", None).await;
        let err = get_own(&state, &caller(&member), ArtifactKind::MembershipCard).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn bulk_skips_existing_and_counts() {
        let state = test_state();
        let admin = PrincipalId::new();
        let first = enrolled(&state, "a@campus.test", "Class 10", "R-1").await;
        enrolled(&state, "b@campus.test", "Class 10", "R-2").await;
        enrolled(&state, "c@campus.test", "class 9", "R-3").await;
        register(&state, Role::Student, "d@campus.test", Some("Class 10")).await;

        generate(
            &state,
            first.id,
            ArtifactKind::AdmitCard,
            ArtifactParams::Exam(exam("Annual Exam")),
            None,
            admin,
        )
        .await
        .unwrap();

        let outcome = generate_for_class(&state, "CLASS 10", exam("Annual Exam"), admin)
            .await
            .unwrap();
        assert_eq!(outcome.generated, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.ineligible, 1);

        let all = generate_for_class(&state, "all", exam("annual exam"), admin)
            .await
            .unwrap();
        assert_eq!(all.generated, 1, "only the class 9 student is left");
        assert_eq!(all.skipped, 2);
        assert_eq!(all.generated + all.failed, 1);
    }

    #[tokio::test]
    async fn bulk_rejects_invalid_parameters() {
        let state = test_state();
        let mut bad = exam("Annual Exam");
        bad.exam_center = "  ".to_string();
        let err = generate_for_class(&state, "all", bad, PrincipalId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidField { field: "exam_center", .. }));

        let err = generate_for_class(&state, " ", exam("Annual Exam"), PrincipalId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidField { field: "class_name", .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_generation_yields_one_artifact() {
        let state = test_state();
        let student = enrolled(&state, "s@campus.test", "Class 10", "R-7").await;

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move {
                    generate(
                        &state,
                        student.id,
                        ArtifactKind::AdmitCard,
                        ArtifactParams::Exam(exam("Annual Exam")),
                        None,
                        PrincipalId::new(),
                    )
                    .await
                    .is_ok()
                })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(state.artifacts.count_by_kind()[&ArtifactKind::AdmitCard], 1);
    }

    fn caller(p: &Principal) -> CallerIdentity {
        CallerIdentity {
            principal_id: p.id,
            role: p.role(),
        }
    }
}
