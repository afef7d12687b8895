//! Authenticated-session extractors.
//!
//! The bearer token is resolved through the identity provider on every
//! request and the caller's role comes from their own persisted profile.
//! Nothing client-supplied decides authorization.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::modules::profiles::model::{ApprovalStatus, Profile};
use crate::identity::model::Identity;
use crate::policy::Actor;
use crate::state::AppState;
use crate::utils::errors::AppError;

/// Extractor that validates the bearer token against the identity provider
/// and loads the caller's profile, when one exists.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub identity: Identity,
    pub profile: Option<Profile>,
}

impl AuthSession {
    /// The policy actor this session acts as. Only an APPROVED profile
    /// grants member standing; pending and rejected registrants stay plain
    /// registrants.
    pub fn actor(&self) -> Actor {
        match &self.profile {
            Some(profile) if profile.status == ApprovalStatus::Approved => Actor::Member {
                identity_id: self.identity.id,
                profile_id: profile.id,
                role: profile.role,
            },
            _ => Actor::Registrant {
                identity_id: self.identity.id,
            },
        }
    }
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthorized("Invalid authorization header format"))?;

        let identity = state
            .identity
            .get_user(token)
            .await?
            .ok_or_else(|| AppError::unauthorized("Unknown identity"))?;

        let actor = Actor::Registrant {
            identity_id: identity.id,
        };
        let profile = state.store.find_by_identity(&actor, identity.id).await?;

        Ok(AuthSession { identity, profile })
    }
}

/// Extractor for approver-only routes: the caller must hold an approved
/// admin or teacher profile. Per-row authorization (e.g. teachers touching
/// only student profiles) still happens in the policy layer.
#[derive(Debug, Clone)]
pub struct Approver(pub AuthSession);

impl FromRequestParts<AppState> for Approver {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = AuthSession::from_request_parts(parts, state).await?;

        if session.actor().approver_role().is_none() {
            return Err(AppError::policy_denied(
                "Only approved admins and teachers may review registrations",
            ));
        }

        Ok(Approver(session))
    }
}
