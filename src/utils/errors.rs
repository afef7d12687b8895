//! Application error types and handling.
//!
//! Every failure in the registration/approval core is mapped into one of the
//! variants below before it crosses the API boundary. Transport-level errors
//! from the identity provider or the store never escape raw; they arrive here
//! as [`AppError::Internal`] with the cause preserved for logging.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::identity::provider::IdentityError;
use crate::policy::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Bad input caught before any external call. Never retried.
    #[error("{0}")]
    Validation(String),

    /// Business-rule rejection from the identity provider (duplicate email,
    /// weak credential). Surfaced verbatim, never retried.
    #[error("{0}")]
    IdentityProvider(String),

    /// Profile insert failed for a reason other than a uniqueness conflict.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// The access policy layer refused the operation. Retrying cannot change
    /// an authorization outcome.
    #[error("{0}")]
    PolicyDenied(String),

    /// Enrollment number collision that recurred after re-allocation.
    #[error("{0}")]
    AllocationConflict(String),

    #[error("{0}")]
    NotFound(String),

    /// Rejected no-op, e.g. a transition on a profile that is not PENDING.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn identity_provider(msg: impl Into<String>) -> Self {
        Self::IdentityProvider(msg.into())
    }

    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }

    pub fn policy_denied(msg: impl Into<String>) -> Self {
        Self::PolicyDenied(msg.into())
    }

    pub fn allocation_conflict(msg: impl Into<String>) -> Self {
        Self::AllocationConflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn internal<E>(err: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self::Internal(err.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::IdentityProvider(_) => StatusCode::BAD_REQUEST,
            AppError::Provisioning(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PolicyDenied(_) => StatusCode::FORBIDDEN,
            AppError::AllocationConflict(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(err) = &self {
            tracing::error!(error = ?err, "unhandled internal error");
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (self.status(), body).into_response()
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::DuplicateEmail
            | IdentityError::WeakPassword(_)
            | IdentityError::MetadataRejected(_) => AppError::IdentityProvider(err.to_string()),
            IdentityError::InvalidCredentials
            | IdentityError::EmailNotConfirmed
            | IdentityError::InvalidToken => AppError::Unauthorized(err.to_string()),
            IdentityError::Transport(source) => {
                AppError::Internal(source.context("identity provider call failed"))
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PolicyDenied(msg) => AppError::PolicyDenied(msg),
            StoreError::UniqueViolation(key) => {
                AppError::Conflict(format!("unique constraint violated: {key}"))
            }
            StoreError::Database(source) => {
                AppError::Internal(source.context("store operation failed"))
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_denial_maps_to_forbidden() {
        let err = AppError::policy_denied("teachers may only approve student profiles");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_not_found_distinct_from_denial() {
        assert_ne!(
            AppError::not_found("profile not found").status(),
            AppError::policy_denied("access denied").status()
        );
    }

    #[test]
    fn test_provider_business_errors_map_to_bad_request() {
        let err: AppError = IdentityError::DuplicateEmail.into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err: AppError = IdentityError::WeakPassword("too short".into()).into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_transport_errors_stay_internal() {
        let err: AppError = IdentityError::Transport(anyhow::anyhow!("connection refused")).into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // The raw cause must not leak into the response body.
        assert_eq!(err.to_string(), "internal server error");
    }
}
