use axum::Json;
use axum::extract::{Path, State};
use tracing::instrument;
use uuid::Uuid;

use crate::middleware::auth::Approver;
use crate::modules::profiles::model::Profile;
use crate::modules::registration::controller::ErrorResponse;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::validator::ValidatedJson;

use super::model::{ApprovalAction, BulkApprovalOutcome, RejectDto};
use super::service::ApprovalService;

/// Approve a pending profile
#[utoipa::path(
    post,
    path = "/api/approvals/{profile_id}/approve",
    params(("profile_id" = Uuid, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Profile approved", body = Profile),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller may not decide this profile", body = ErrorResponse),
        (status = 404, description = "Profile not found", body = ErrorResponse),
        (status = 409, description = "Profile is not pending", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Approvals"
)]
#[instrument(skip(state, approver))]
pub async fn approve_profile(
    State(state): State<AppState>,
    approver: Approver,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<Profile>, AppError> {
    let profile = ApprovalService::approve(&state, &approver.0, profile_id).await?;
    Ok(Json(profile))
}

/// Reject a pending profile with a reason
#[utoipa::path(
    post,
    path = "/api/approvals/{profile_id}/reject",
    params(("profile_id" = Uuid, Path, description = "Profile id")),
    request_body = RejectDto,
    responses(
        (status = 200, description = "Profile rejected", body = Profile),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller may not decide this profile", body = ErrorResponse),
        (status = 404, description = "Profile not found", body = ErrorResponse),
        (status = 409, description = "Profile is not pending", body = ErrorResponse),
        (status = 422, description = "Missing rejection reason", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Approvals"
)]
#[instrument(skip(state, approver, dto))]
pub async fn reject_profile(
    State(state): State<AppState>,
    approver: Approver,
    Path(profile_id): Path<Uuid>,
    ValidatedJson(dto): ValidatedJson<RejectDto>,
) -> Result<Json<Profile>, AppError> {
    let profile = ApprovalService::reject(&state, &approver.0, profile_id, dto.reason).await?;
    Ok(Json(profile))
}

/// Approve every pending profile the caller may decide
///
/// Best-effort: rows transition independently and failures are reported,
/// not rolled back.
#[utoipa::path(
    post,
    path = "/api/approvals/approve-all",
    responses(
        (status = 200, description = "Success count and per-row failures", body = BulkApprovalOutcome),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller is not an approver", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Approvals"
)]
#[instrument(skip(state, approver))]
pub async fn approve_all(
    State(state): State<AppState>,
    approver: Approver,
) -> Result<Json<BulkApprovalOutcome>, AppError> {
    let outcome = ApprovalService::approve_all(&state, &approver.0).await?;
    Ok(Json(outcome))
}

/// Audit trail for a profile
#[utoipa::path(
    get,
    path = "/api/approvals/{profile_id}/actions",
    params(("profile_id" = Uuid, Path, description = "Profile id")),
    responses(
        (status = 200, description = "Approval actions, oldest first", body = [ApprovalAction]),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller may not read this audit trail", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Approvals"
)]
#[instrument(skip(state, approver))]
pub async fn list_actions(
    State(state): State<AppState>,
    approver: Approver,
    Path(profile_id): Path<Uuid>,
) -> Result<Json<Vec<ApprovalAction>>, AppError> {
    let actions = state
        .store
        .list_actions(&approver.0.actor(), profile_id)
        .await?;
    Ok(Json(actions))
}
