//! Approval state machine.
//!
//! PENDING → APPROVED or PENDING → REJECTED, never out of a terminal state.
//! The status write is a conditional update keyed on the expected status, so
//! of two concurrent deciders exactly one wins, and only the winner appends
//! the audit row.

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::metrics;
use crate::middleware::auth::AuthSession;
use crate::modules::profiles::model::{ApprovalStatus, Profile};
use crate::policy::store::{NewApprovalAction, StatusTransition, TransitionOutcome};
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::pagination::PaginationParams;

use super::model::{ApprovalActionKind, BulkApprovalFailure, BulkApprovalOutcome};

pub struct ApprovalService;

impl ApprovalService {
    #[instrument(skip(state, session))]
    pub async fn approve(
        state: &AppState,
        session: &AuthSession,
        profile_id: Uuid,
    ) -> Result<Profile, AppError> {
        Self::transition(state, session, profile_id, ApprovalActionKind::Approve, None).await
    }

    #[instrument(skip(state, session, reason))]
    pub async fn reject(
        state: &AppState,
        session: &AuthSession,
        profile_id: Uuid,
        reason: String,
    ) -> Result<Profile, AppError> {
        if reason.trim().is_empty() {
            return Err(AppError::validation("rejection reason must not be empty"));
        }
        Self::transition(
            state,
            session,
            profile_id,
            ApprovalActionKind::Reject,
            Some(reason),
        )
        .await
    }

    /// Best-effort bulk approval over the caller's visible pending set.
    /// Every row transitions independently; one failure rolls nothing back.
    #[instrument(skip(state, session))]
    pub async fn approve_all(
        state: &AppState,
        session: &AuthSession,
    ) -> Result<BulkApprovalOutcome, AppError> {
        let actor = session.actor();

        // Snapshot the pending ids first; rows that get decided concurrently
        // while we work simply show up as failures.
        let mut ids: Vec<Uuid> = Vec::new();
        let mut offset = 0;
        loop {
            let params = PaginationParams {
                limit: Some(100),
                offset: Some(offset),
                page: None,
            };
            let (rows, total) = state
                .store
                .list_by_status(&actor, ApprovalStatus::Pending, &params)
                .await?;
            if rows.is_empty() {
                break;
            }
            ids.extend(rows.iter().map(|p| p.id));
            offset += 100;
            if offset >= total {
                break;
            }
        }

        let mut approved = 0;
        let mut failures = Vec::new();
        for id in ids {
            match Self::transition(state, session, id, ApprovalActionKind::Approve, None).await {
                Ok(_) => approved += 1,
                Err(err) => failures.push(BulkApprovalFailure {
                    profile_id: id,
                    error: err.to_string(),
                }),
            }
        }

        info!(approved, failed = failures.len(), "bulk approval finished");
        Ok(BulkApprovalOutcome { approved, failures })
    }

    async fn transition(
        state: &AppState,
        session: &AuthSession,
        profile_id: Uuid,
        kind: ApprovalActionKind,
        reason: Option<String>,
    ) -> Result<Profile, AppError> {
        let actor = session.actor();
        let approver_role = actor.approver_role().ok_or_else(|| {
            AppError::policy_denied("only approved admins and teachers may approve or reject")
        })?;

        // Row-level read: a teacher asking about another teacher's profile
        // is denied here, before any state is touched.
        let profile = state
            .store
            .find_by_id(&actor, profile_id)
            .await?
            .ok_or_else(|| AppError::not_found("profile not found"))?;

        // Terminal states reject the transition as a no-op; no audit row.
        if profile.status != ApprovalStatus::Pending {
            return Err(AppError::conflict(format!(
                "profile is already {}; only pending profiles can be decided",
                profile.status
            )));
        }

        let new_status = match kind {
            ApprovalActionKind::Approve => ApprovalStatus::Approved,
            ApprovalActionKind::Reject => ApprovalStatus::Rejected,
        };
        let transition = StatusTransition {
            expected: ApprovalStatus::Pending,
            new_status,
            actor_identity: session.identity.id,
            at: Utc::now(),
            reason: reason.clone(),
        };

        match state
            .store
            .transition_status(&actor, profile_id, transition)
            .await?
        {
            TransitionOutcome::Applied(updated) => {
                state
                    .store
                    .append_action(
                        &actor,
                        NewApprovalAction {
                            profile_id,
                            approver_id: session.identity.id,
                            approver_role,
                            action: kind,
                            reason,
                        },
                    )
                    .await?;
                metrics::track_approval_decision(kind.as_str(), approver_role.as_str());
                info!(profile_id = %profile_id, status = %updated.status, "approval decision recorded");
                Ok(updated)
            }
            TransitionOutcome::PreconditionFailed => Err(AppError::conflict(
                "profile is no longer pending; a concurrent decision was recorded first",
            )),
            TransitionOutcome::NotFound => Err(AppError::not_found("profile not found")),
        }
    }
}
