//! Hosted identity provider adapter.
//!
//! Speaks the signup/token/user/verify surface of a GoTrue-style identity
//! service over HTTP. Provider business-rule rejections arrive as error
//! codes in the response body and are mapped onto [`IdentityError`] so the
//! orchestrator can branch deterministically; transport failures never
//! escape raw.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use super::model::{CreateAccountOutcome, Identity, Session};
use super::provider::{CreateAccount, IdentityError, IdentityProvider};
use crate::config::identity::IdentityProviderConfig;

pub struct HttpIdentityProvider {
    config: IdentityProviderConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: Uuid,
    email: String,
    #[serde(default)]
    email_confirmed_at: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

impl WireUser {
    fn into_identity(self) -> Identity {
        Identity {
            id: self.id,
            email: self.email,
            email_confirmed: self.email_confirmed_at.is_some(),
            metadata: self.user_metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireSignupResponse {
    user: WireUser,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default, alias = "error_description", alias = "message")]
    msg: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(config: IdentityProviderConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn transport(err: reqwest::Error) -> IdentityError {
        IdentityError::Transport(anyhow::Error::from(err))
    }

    /// Map an error-status response onto the typed taxonomy.
    async fn map_error(response: reqwest::Response) -> IdentityError {
        let status = response.status();
        let wire: WireError = match response.json().await {
            Ok(wire) => wire,
            Err(err) => return Self::transport(err),
        };
        let code = wire.error_code.as_deref().unwrap_or("");
        let msg = wire.msg.unwrap_or_else(|| status.to_string());

        match code {
            "user_already_exists" | "email_exists" => IdentityError::DuplicateEmail,
            "weak_password" => IdentityError::WeakPassword(msg),
            "invalid_metadata" | "metadata_too_large" => IdentityError::MetadataRejected(msg),
            "email_not_confirmed" => IdentityError::EmailNotConfirmed,
            _ => match status {
                StatusCode::UNPROCESSABLE_ENTITY if msg.contains("already registered") => {
                    IdentityError::DuplicateEmail
                }
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    IdentityError::InvalidCredentials
                }
                _ => IdentityError::Transport(anyhow::anyhow!(
                    "identity provider answered {status}: {msg}"
                )),
            },
        }
    }

    fn signup_body(req: &CreateAccount) -> Value {
        json!({
            "email": req.email,
            "password": req.password,
            "data": req.metadata.to_value(),
            "options": {
                "email_redirect_to": req.confirmation_redirect,
            },
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_account(
        &self,
        req: CreateAccount,
    ) -> Result<CreateAccountOutcome, IdentityError> {
        let response = self
            .client
            .post(self.url("signup"))
            .header("apikey", &self.config.api_key)
            .header("Idempotency-Key", req.idempotency_key.to_string())
            .json(&Self::signup_body(&req))
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::map_error(response).await);
        }

        let wire: WireSignupResponse = response.json().await.map_err(Self::transport)?;
        let session = match (wire.access_token, wire.expires_in) {
            (Some(access_token), Some(expires_in)) => Some(Session {
                access_token,
                expires_in,
            }),
            _ => None,
        };

        Ok(CreateAccountOutcome {
            identity: wire.user.into_identity(),
            session,
        })
    }

    async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<(Identity, Session), IdentityError> {
        let response = self
            .client
            .post(self.url("token?grant_type=password"))
            .header("apikey", &self.config.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::map_error(response).await);
        }

        #[derive(Deserialize)]
        struct WireTokenResponse {
            access_token: String,
            expires_in: i64,
            user: WireUser,
        }

        let wire: WireTokenResponse = response.json().await.map_err(Self::transport)?;
        Ok((
            wire.user.into_identity(),
            Session {
                access_token: wire.access_token,
                expires_in: wire.expires_in,
            },
        ))
    }

    async fn get_user(&self, access_token: &str) -> Result<Option<Identity>, IdentityError> {
        let response = self
            .client
            .get(self.url("user"))
            .header("apikey", &self.config.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            StatusCode::OK => {
                let wire: WireUser = response.json().await.map_err(Self::transport)?;
                Ok(Some(wire.into_identity()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::InvalidToken),
            _ => Err(Self::map_error(response).await),
        }
    }

    async fn confirm_email(&self, token: &str) -> Result<Identity, IdentityError> {
        let response = self
            .client
            .post(self.url("verify"))
            .header("apikey", &self.config.api_key)
            .json(&json!({ "type": "signup", "token": token }))
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            let err = Self::map_error(response).await;
            return Err(match err {
                IdentityError::InvalidCredentials => IdentityError::InvalidToken,
                other => other,
            });
        }

        let wire: WireSignupResponse = response.json().await.map_err(Self::transport)?;
        Ok(wire.user.into_identity())
    }
}
