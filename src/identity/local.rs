//! Embedded identity provider for development and tests.
//!
//! Implements the full provider contract in-process: bcrypt credential
//! hashing, JWT access tokens, random confirmation tokens, and optional SMTP
//! delivery of the confirmation link. Accounts live in memory; this is not a
//! durable store and is never used in production deployments, which point at
//! a hosted provider through [`super::http::HttpIdentityProvider`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::mailer::ConfirmationMailer;
use super::model::{CreateAccountOutcome, Identity, Session, SignupMetadata};
use super::provider::{CreateAccount, IdentityError, IdentityProvider};
use crate::config::email::EmailConfig;

const MIN_PASSWORD_LEN: usize = 8;
const CONFIRMATION_TOKEN_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct LocalProviderConfig {
    /// When true, signups get no session and must complete the email
    /// confirmation round trip before provisioning happens.
    pub require_confirmation: bool,
    pub jwt_secret: String,
    pub access_token_expiry: i64,
    pub bcrypt_cost: u32,
    /// Metadata blobs above this size are rejected with a typed
    /// `MetadataRejected` code, mirroring hosted-provider payload limits.
    pub max_metadata_bytes: usize,
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            require_confirmation: true,
            jwt_secret: "local-provider-secret-change-in-production".to_string(),
            access_token_expiry: 3600,
            bcrypt_cost: DEFAULT_COST,
            max_metadata_bytes: 4096,
        }
    }
}

impl LocalProviderConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            require_confirmation: std::env::var("IDENTITY_REQUIRE_CONFIRMATION")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.require_confirmation),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or(default.jwt_secret),
            access_token_expiry: std::env::var("JWT_ACCESS_EXPIRY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.access_token_expiry),
            bcrypt_cost: default.bcrypt_cost,
            max_metadata_bytes: std::env::var("IDENTITY_MAX_METADATA_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_metadata_bytes),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    exp: usize,
    iat: usize,
}

struct Account {
    identity: Identity,
    password_hash: String,
}

#[derive(Default)]
struct ProviderState {
    accounts: HashMap<Uuid, Account>,
    by_email: HashMap<String, Uuid>,
    /// Confirmation token -> identity. Tokens stay mapped after use so a
    /// duplicate callback resolves to the same (already confirmed) identity.
    confirmations: HashMap<String, Uuid>,
    /// Idempotency key -> identity, so a retried create lands on the same
    /// logical signup.
    idempotency: HashMap<Uuid, Uuid>,
}

pub struct LocalIdentityProvider {
    config: LocalProviderConfig,
    state: RwLock<ProviderState>,
    mailer: Option<ConfirmationMailer>,
    create_calls: AtomicUsize,
}

impl LocalIdentityProvider {
    pub fn new(config: LocalProviderConfig, email_config: EmailConfig) -> Self {
        let mailer = email_config
            .enabled
            .then(|| ConfirmationMailer::new(email_config));
        Self {
            config,
            state: RwLock::new(ProviderState::default()),
            mailer,
            create_calls: AtomicUsize::new(0),
        }
    }

    fn issue_session(&self, identity: &Identity) -> Result<Session, IdentityError> {
        let now = Utc::now().timestamp() as usize;
        let exp = now + self.config.access_token_expiry as usize;

        let claims = Claims {
            sub: identity.id.to_string(),
            email: identity.email.clone(),
            exp,
            iat: now,
        };

        let access_token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| IdentityError::Transport(anyhow::anyhow!("token issuance failed: {e}")))?;

        Ok(Session {
            access_token,
            expires_in: self.config.access_token_expiry,
        })
    }

    fn generate_confirmation_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CONFIRMATION_TOKEN_LEN)
            .map(char::from)
            .collect()
    }

    fn check_metadata(&self, metadata: &SignupMetadata) -> Result<(), IdentityError> {
        let size = metadata.to_value().to_string().len();
        if size > self.config.max_metadata_bytes {
            return Err(IdentityError::MetadataRejected(format!(
                "metadata payload of {size} bytes exceeds the {} byte limit",
                self.config.max_metadata_bytes
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    #[instrument(skip(self, req), fields(email = %req.email))]
    async fn create_account(
        &self,
        req: CreateAccount,
    ) -> Result<CreateAccountOutcome, IdentityError> {
        self.create_calls.fetch_add(1, Ordering::Relaxed);

        // Metadata shape is checked before anything is written, so a
        // rejected payload leaves no partial account behind.
        self.check_metadata(&req.metadata)?;

        if req.password.len() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let email = req.email.to_lowercase();
        let password_hash = hash(&req.password, self.config.bcrypt_cost)
            .map_err(|e| IdentityError::Transport(anyhow::anyhow!("bcrypt failure: {e}")))?;

        let (identity, confirmation) = {
            let mut state = self.state.write().await;

            if let Some(existing_id) = state.idempotency.get(&req.idempotency_key) {
                let identity = state
                    .accounts
                    .get(existing_id)
                    .map(|a| a.identity.clone())
                    .ok_or_else(|| {
                        IdentityError::Transport(anyhow::anyhow!("idempotency key maps to a missing account"))
                    })?;
                let session = (!self.config.require_confirmation)
                    .then(|| self.issue_session(&identity))
                    .transpose()?;
                return Ok(CreateAccountOutcome { identity, session });
            }

            if state.by_email.contains_key(&email) {
                return Err(IdentityError::DuplicateEmail);
            }

            let identity = Identity {
                id: Uuid::new_v4(),
                email: email.clone(),
                email_confirmed: !self.config.require_confirmation,
                metadata: req.metadata.to_value(),
            };

            let confirmation = self.config.require_confirmation.then(|| {
                let token = Self::generate_confirmation_token();
                state.confirmations.insert(token.clone(), identity.id);
                token
            });

            state.by_email.insert(email, identity.id);
            state.idempotency.insert(req.idempotency_key, identity.id);
            state.accounts.insert(
                identity.id,
                Account {
                    identity: identity.clone(),
                    password_hash,
                },
            );

            (identity, confirmation)
        };

        if let Some(token) = confirmation {
            let link = format!("{}?token={}", req.confirmation_redirect, token);
            if let Some(mailer) = &self.mailer {
                if let Err(e) = mailer
                    .send_confirmation_email(&identity.email, &req.metadata.full_name, &link)
                    .await
                {
                    // Email delivery is best-effort; the token stays valid
                    // and can be re-sent by an operator.
                    warn!(error = %e, "failed to send confirmation email");
                }
            } else {
                info!(confirmation_link = %link, "SMTP disabled; confirmation link logged");
            }
            return Ok(CreateAccountOutcome {
                identity,
                session: None,
            });
        }

        let session = self.issue_session(&identity)?;
        Ok(CreateAccountOutcome {
            identity,
            session: Some(session),
        })
    }

    #[instrument(skip(self, password))]
    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(Identity, Session), IdentityError> {
        let email = email.to_lowercase();
        let (identity, password_hash) = {
            let state = self.state.read().await;
            let id = state
                .by_email
                .get(&email)
                .ok_or(IdentityError::InvalidCredentials)?;
            let account = state
                .accounts
                .get(id)
                .ok_or(IdentityError::InvalidCredentials)?;
            (account.identity.clone(), account.password_hash.clone())
        };

        let valid = verify(password, &password_hash)
            .map_err(|e| IdentityError::Transport(anyhow::anyhow!("bcrypt failure: {e}")))?;
        if !valid {
            return Err(IdentityError::InvalidCredentials);
        }
        if !identity.email_confirmed {
            return Err(IdentityError::EmailNotConfirmed);
        }

        let session = self.issue_session(&identity)?;
        Ok((identity, session))
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, IdentityError> {
        let claims = decode::<Claims>(
            access_token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| IdentityError::InvalidToken)?;

        let id = Uuid::parse_str(&claims.sub).map_err(|_| IdentityError::InvalidToken)?;

        let state = self.state.read().await;
        Ok(state.accounts.get(&id).map(|a| a.identity.clone()))
    }

    #[instrument(skip(self, token))]
    async fn confirm_email(&self, token: &str) -> Result<Identity, IdentityError> {
        let mut state = self.state.write().await;
        let id = *state
            .confirmations
            .get(token)
            .ok_or(IdentityError::InvalidToken)?;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(IdentityError::InvalidToken)?;
        // Repeated callbacks land here again and simply re-confirm.
        account.identity.email_confirmed = true;
        Ok(account.identity.clone())
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl LocalIdentityProvider {
    /// Number of accounts the provider currently holds.
    pub async fn account_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    /// Number of `create_account` calls the provider has received, including
    /// rejected ones. Lets tests assert that validation failures never reach
    /// the provider.
    pub fn create_call_count(&self) -> usize {
        self.create_calls.load(Ordering::Relaxed)
    }

    /// The pending confirmation token for an email, if any. Tests use this
    /// instead of scraping a mailbox.
    pub async fn confirmation_token_for(&self, email: &str) -> Option<String> {
        let email = email.to_lowercase();
        let state = self.state.read().await;
        let id = state.by_email.get(&email)?;
        state
            .confirmations
            .iter()
            .find(|(_, identity_id)| *identity_id == id)
            .map(|(token, _)| token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::profiles::model::Role;

    fn test_provider(require_confirmation: bool) -> LocalIdentityProvider {
        LocalIdentityProvider::new(
            LocalProviderConfig {
                require_confirmation,
                bcrypt_cost: 4,
                ..LocalProviderConfig::default()
            },
            EmailConfig::disabled(),
        )
    }

    fn signup(email: &str) -> CreateAccount {
        CreateAccount {
            email: email.to_string(),
            password: "password123".to_string(),
            metadata: SignupMetadata {
                role: Role::Teacher,
                full_name: "T Teacher".to_string(),
                student: None,
                teacher: None,
            },
            confirmation_redirect: "http://localhost:3000/api/auth/confirm".to_string(),
            idempotency_key: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let provider = test_provider(false);
        provider.create_account(signup("dup@example.com")).await.unwrap();
        let err = provider
            .create_account(signup("dup@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_weak_password_rejected() {
        let provider = test_provider(false);
        let mut req = signup("weak@example.com");
        req.password = "short".to_string();
        let err = provider.create_account(req).await.unwrap_err();
        assert!(matches!(err, IdentityError::WeakPassword(_)));
        assert_eq!(provider.account_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_granted_only_without_confirmation() {
        let provider = test_provider(false);
        let outcome = provider.create_account(signup("now@example.com")).await.unwrap();
        assert!(outcome.session.is_some());
        assert!(outcome.identity.email_confirmed);

        let provider = test_provider(true);
        let outcome = provider.create_account(signup("later@example.com")).await.unwrap();
        assert!(outcome.session.is_none());
        assert!(!outcome.identity.email_confirmed);
    }

    #[tokio::test]
    async fn test_confirm_email_is_idempotent() {
        let provider = test_provider(true);
        provider.create_account(signup("slow@example.com")).await.unwrap();
        let token = provider
            .confirmation_token_for("slow@example.com")
            .await
            .unwrap();

        let first = provider.confirm_email(&token).await.unwrap();
        let second = provider.confirm_email(&token).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.email_confirmed);
        assert_eq!(provider.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_idempotency_key_reuses_account() {
        let provider = test_provider(false);
        let req = signup("retry@example.com");
        let key = req.idempotency_key;
        let first = provider.create_account(req).await.unwrap();

        let mut retry = signup("retry@example.com");
        retry.idempotency_key = key;
        let second = provider.create_account(retry).await.unwrap();
        assert_eq!(first.identity.id, second.identity.id);
        assert_eq!(provider.account_count().await, 1);
    }

    #[tokio::test]
    async fn test_oversized_metadata_gets_typed_rejection() {
        let provider = LocalIdentityProvider::new(
            LocalProviderConfig {
                require_confirmation: false,
                bcrypt_cost: 4,
                max_metadata_bytes: 32,
                ..LocalProviderConfig::default()
            },
            EmailConfig::disabled(),
        );
        let err = provider
            .create_account(signup("meta@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::MetadataRejected(_)));
    }

    #[tokio::test]
    async fn test_sign_in_requires_confirmed_email() {
        let provider = test_provider(true);
        provider.create_account(signup("hold@example.com")).await.unwrap();

        let err = provider
            .sign_in("hold@example.com", "password123")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::EmailNotConfirmed));

        let token = provider
            .confirmation_token_for("hold@example.com")
            .await
            .unwrap();
        provider.confirm_email(&token).await.unwrap();

        let (identity, session) = provider
            .sign_in("hold@example.com", "password123")
            .await
            .unwrap();
        assert_eq!(identity.email, "hold@example.com");
        let resolved = provider.get_user(&session.access_token).await.unwrap();
        assert_eq!(resolved.unwrap().id, identity.id);
    }
}
