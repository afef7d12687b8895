//! Identity provider contract.
//!
//! The core consumes the provider as an opaque capability: create an
//! account, resolve the identity behind an access token, complete an email
//! confirmation. Authentication mechanics (password hashing, token issuance,
//! email delivery) are entirely the provider's business.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use super::model::{CreateAccountOutcome, Identity, Session, SignupMetadata};

/// Account-creation request. The idempotency key makes a retried call (e.g.
/// with a reduced metadata payload) land on the same logical signup instead
/// of producing a second account.
#[derive(Debug, Clone)]
pub struct CreateAccount {
    pub email: String,
    pub password: String,
    pub metadata: SignupMetadata,
    pub confirmation_redirect: String,
    pub idempotency_key: Uuid,
}

/// Typed provider failures. Business-rule rejections carry explicit codes so
/// the orchestrator branches deterministically instead of probing payload
/// shapes.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("an account with this email already exists")]
    DuplicateEmail,

    #[error("password rejected by identity provider: {0}")]
    WeakPassword(String),

    /// The provider rejected the metadata blob's shape or size. This is an
    /// implementation quirk, not a business rule; the orchestrator may retry
    /// with a reduced payload.
    #[error("signup metadata rejected: {0}")]
    MetadataRejected(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email not confirmed")]
    EmailNotConfirmed,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("identity provider transport failure")]
    Transport(#[source] anyhow::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account with the role/attribute snapshot embedded as
    /// metadata. Returns the identity and, when the provider is configured
    /// without email confirmation, an active session.
    async fn create_account(&self, req: CreateAccount) -> Result<CreateAccountOutcome, IdentityError>;

    /// Password sign-in for an existing, confirmed account.
    async fn sign_in(&self, email: &str, password: &str)
    -> Result<(Identity, Session), IdentityError>;

    /// Resolve the identity behind an access token, if any.
    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, IdentityError>;

    /// Complete an email confirmation round trip. Must tolerate repeated
    /// invocation with the same token (browser refresh, duplicate callback).
    async fn confirm_email(&self, token: &str) -> Result<Identity, IdentityError>;
}
