use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use tracing::instrument;
use utoipa::ToSchema;

use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::validator::ValidatedJson;

use super::model::{ConfirmQuery, LoginRequest, LoginResponse, RegisterDto, RegistrationResult};
use super::service::RegistrationService;

#[derive(ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Register a new student, teacher, or admin
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterDto,
    responses(
        (status = 201, description = "Registration accepted; may require email confirmation", body = RegistrationResult),
        (status = 400, description = "Identity provider rejected the registration", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Registration"
)]
#[instrument(skip(state, dto))]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<RegisterDto>,
) -> Result<(StatusCode, Json<RegistrationResult>), AppError> {
    let result = RegistrationService::register(&state, dto).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// Email confirmation callback
///
/// The identity provider redirects the browser here once the registrant
/// clicks the confirmation link. Safe to hit more than once.
#[utoipa::path(
    get,
    path = "/api/auth/confirm",
    params(("token" = String, Query, description = "Confirmation token issued at signup")),
    responses(
        (status = 200, description = "Email confirmed; profile provisioned", body = RegistrationResult),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Registration"
)]
#[instrument(skip(state, query))]
pub async fn confirm(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Json<RegistrationResult>, AppError> {
    let result = RegistrationService::on_email_confirmed(&state, &query.token).await?;
    Ok(Json(result))
}

/// Login and receive an access token
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials or unconfirmed email", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Registration"
)]
#[instrument(skip(state, dto))]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(dto): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let response = RegistrationService::login(&state, dto).await?;
    Ok(Json(response))
}
