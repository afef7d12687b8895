use axum::Json;
use axum::extract::{Path, Query, State};
use tracing::instrument;
use uuid::Uuid;

use crate::middleware::auth::{Approver, AuthSession};
use crate::modules::registration::controller::ErrorResponse;
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::pagination::PaginationParams;

use super::model::{PaginatedProfilesResponse, Profile};
use super::service::ProfileService;

/// Get the caller's own profile
///
/// Returns 404 while provisioning is still deferred (email not confirmed).
#[utoipa::path(
    get,
    path = "/api/profiles/me",
    responses(
        (status = 200, description = "The caller's profile", body = Profile),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "No profile provisioned yet", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Profiles"
)]
#[instrument(skip(state, session))]
pub async fn get_own_profile(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<Profile>, AppError> {
    let profile =
        ProfileService::get_own_profile(&state, &session.actor(), session.identity.id)
            .await?
            .ok_or_else(|| AppError::not_found("no profile provisioned for this identity yet"))?;
    Ok(Json(profile))
}

/// List pending profiles awaiting a decision
///
/// Admins see every pending profile; teachers see pending students only.
#[utoipa::path(
    get,
    path = "/api/profiles/pending",
    params(PaginationParams),
    responses(
        (status = 200, description = "Pending profiles, oldest first", body = PaginatedProfilesResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller is not an approver", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Profiles"
)]
#[instrument(skip(state, approver, pagination))]
pub async fn list_pending(
    State(state): State<AppState>,
    approver: Approver,
    Query(pagination): Query<PaginationParams>,
) -> Result<Json<PaginatedProfilesResponse>, AppError> {
    let response = ProfileService::list_pending(&state, &approver.0.actor(), pagination).await?;
    Ok(Json(response))
}

/// Get a profile by id
#[utoipa::path(
    get,
    path = "/api/profiles/{id}",
    params(("id" = Uuid, Path, description = "Profile id")),
    responses(
        (status = 200, description = "The profile", body = Profile),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Not allowed to read this profile", body = ErrorResponse),
        (status = 404, description = "Profile not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Profiles"
)]
#[instrument(skip(state, session))]
pub async fn get_profile(
    State(state): State<AppState>,
    session: AuthSession,
    Path(id): Path<Uuid>,
) -> Result<Json<Profile>, AppError> {
    let profile = ProfileService::get_profile(&state, &session.actor(), id).await?;
    Ok(Json(profile))
}
