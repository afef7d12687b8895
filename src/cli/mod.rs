use uuid::Uuid;

use crate::identity::model::SignupMetadata;
use crate::identity::provider::CreateAccount;
use crate::modules::profiles::model::{Profile, Role};
use crate::modules::profiles::service::ProfileProvisioner;
use crate::state::AppState;
use crate::utils::errors::AppError;

/// Bootstrap an admin account + profile from the command line.
///
/// Admin profiles are auto-approved, so this is all a fresh deployment
/// needs before approvers can log in. The account is created through the
/// configured identity provider; if that provider requires email
/// confirmation, the admin still has to confirm before logging in, but the
/// profile is provisioned right away since the operator vouches for the
/// identity.
pub async fn create_admin(
    state: &AppState,
    full_name: &str,
    email: &str,
    password: &str,
) -> Result<Profile, AppError> {
    let metadata = SignupMetadata {
        role: Role::Admin,
        full_name: full_name.to_string(),
        student: None,
        teacher: None,
    };

    let outcome = state
        .identity
        .create_account(CreateAccount {
            email: email.to_string(),
            password: password.to_string(),
            metadata: metadata.clone(),
            confirmation_redirect: state.registration_config.confirmation_redirect.clone(),
            idempotency_key: Uuid::new_v4(),
        })
        .await?;

    ProfileProvisioner::provision(state, &outcome.identity, &metadata).await
}
