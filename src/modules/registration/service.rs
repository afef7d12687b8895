//! Registration orchestration.
//!
//! The single entry point for self-registration. Control flow per request is
//! sequential: validate locally, create the provider account, then branch.
//! A session granted at signup means the provider needs no confirmation and
//! the profile is provisioned synchronously; otherwise the result says
//! `requires_confirmation` and provisioning happens when the confirmation
//! callback fires. Deferred-until-confirmed is the canonical policy; the
//! immediate path exists only because the provider itself may be configured
//! to skip confirmation.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::identity::model::{CreateAccountOutcome, SignupMetadata};
use crate::identity::provider::{CreateAccount, IdentityError};
use crate::metrics;
use crate::modules::profiles::model::Role;
use crate::modules::profiles::service::ProfileProvisioner;
use crate::policy::Actor;
use crate::state::AppState;
use crate::utils::errors::AppError;

use super::model::{LoginRequest, LoginResponse, RegisterDto, RegistrationResult};

pub struct RegistrationService;

impl RegistrationService {
    #[instrument(skip(state, dto), fields(role = %dto.role, email = %dto.email))]
    pub async fn register(
        state: &AppState,
        dto: RegisterDto,
    ) -> Result<RegistrationResult, AppError> {
        // Cross-field validation runs before anything leaves the process;
        // the provider never sees an invalid registration.
        Self::check_role_attributes(&dto)?;
        metrics::track_registration_attempt(dto.role.as_str());

        let metadata = dto.signup_metadata();
        let (outcome, metadata_used) =
            Self::create_account_with_reduction(state, &dto, metadata).await?;

        if outcome.session.is_none() {
            metrics::track_registration_deferred(dto.role.as_str());
            info!(identity_id = %outcome.identity.id, "registration deferred until email confirmation");
            return Ok(RegistrationResult {
                success: true,
                message: "Registration received. Please confirm your email to complete it."
                    .to_string(),
                requires_confirmation: true,
                enrollment_no: None,
            });
        }

        let profile =
            ProfileProvisioner::provision(state, &outcome.identity, &metadata_used).await?;

        Ok(RegistrationResult {
            success: true,
            message: match profile.role {
                Role::Admin => "Registration successful.".to_string(),
                _ => "Registration successful. Your profile is pending approval.".to_string(),
            },
            requires_confirmation: false,
            enrollment_no: profile.enrollment_no().map(str::to_string),
        })
    }

    /// Deferred confirmation handler: the provider verified the token and
    /// hands back the identity with its signup-time snapshot. Provisioning
    /// is idempotent, so duplicate callbacks land on the same profile.
    #[instrument(skip(state, token))]
    pub async fn on_email_confirmed(
        state: &AppState,
        token: &str,
    ) -> Result<RegistrationResult, AppError> {
        let identity = state.identity.confirm_email(token).await?;
        let metadata = identity.signup_metadata().map_err(|e| {
            AppError::provisioning(format!("signup metadata snapshot unreadable: {e}"))
        })?;

        let profile = ProfileProvisioner::provision(state, &identity, &metadata).await?;
        info!(identity_id = %identity.id, profile_id = %profile.id, "email confirmed; profile provisioned");

        Ok(RegistrationResult {
            success: true,
            message: match profile.role {
                Role::Admin => "Email confirmed. Registration complete.".to_string(),
                _ => "Email confirmed. Your profile is pending approval.".to_string(),
            },
            requires_confirmation: false,
            enrollment_no: profile.enrollment_no().map(str::to_string),
        })
    }

    #[instrument(skip(state, dto), fields(email = %dto.email))]
    pub async fn login(state: &AppState, dto: LoginRequest) -> Result<LoginResponse, AppError> {
        let (identity, session) = state.identity.sign_in(&dto.email, &dto.password).await?;
        let actor = Actor::Registrant {
            identity_id: identity.id,
        };
        let profile = state.store.find_by_identity(&actor, identity.id).await?;

        Ok(LoginResponse {
            access_token: session.access_token,
            expires_in: session.expires_in,
            profile,
        })
    }

    /// Account creation with the bounded metadata-reduction ladder. Only the
    /// provider's explicit `MetadataRejected` code triggers a retry, always
    /// under the same idempotency key; business-rule failures surface
    /// immediately.
    async fn create_account_with_reduction(
        state: &AppState,
        dto: &RegisterDto,
        metadata: SignupMetadata,
    ) -> Result<(CreateAccountOutcome, SignupMetadata), AppError> {
        let idempotency_key = Uuid::new_v4();
        let ladder = [
            metadata.clone(),
            metadata.without_optional(),
            metadata.minimal(),
        ];
        let attempts = state
            .registration_config
            .metadata_retry_limit
            .min(ladder.len() - 1)
            + 1;

        let mut last_rejection = None;
        for (attempt, payload) in ladder.into_iter().take(attempts).enumerate() {
            let req = CreateAccount {
                email: dto.email.clone(),
                password: dto.password.clone(),
                metadata: payload.clone(),
                confirmation_redirect: state.registration_config.confirmation_redirect.clone(),
                idempotency_key,
            };

            match state.identity.create_account(req).await {
                Ok(outcome) => return Ok((outcome, payload)),
                Err(IdentityError::MetadataRejected(msg)) => {
                    warn!(attempt, reason = %msg, "provider rejected metadata shape");
                    if attempt + 1 < attempts {
                        metrics::track_metadata_retry();
                    }
                    last_rejection = Some(IdentityError::MetadataRejected(msg));
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(last_rejection
            .expect("reduction loop runs at least once")
            .into())
    }

    fn check_role_attributes(dto: &RegisterDto) -> Result<(), AppError> {
        match dto.role {
            Role::Student if dto.student.is_none() => Err(AppError::validation(
                "student registrations require class level and guardian contact details",
            )),
            Role::Teacher if dto.teacher.is_none() => Err(AppError::validation(
                "teacher registrations require a subject specialization",
            )),
            _ => Ok(()),
        }
    }
}
