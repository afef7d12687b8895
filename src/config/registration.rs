use std::env;

/// Registration pipeline configuration.
#[derive(Clone, Debug)]
pub struct RegistrationConfig {
    /// Where the provider sends the browser after email confirmation. The
    /// deferred confirmation handler lives behind this URL.
    pub confirmation_redirect: String,
    /// Upper bound on reduced-payload retries after a typed metadata
    /// rejection from the provider.
    pub metadata_retry_limit: usize,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            confirmation_redirect: "http://localhost:3000/api/auth/confirm".to_string(),
            metadata_retry_limit: 2,
        }
    }
}

impl RegistrationConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            confirmation_redirect: env::var("CONFIRMATION_REDIRECT_URL")
                .unwrap_or(default.confirmation_redirect),
            metadata_retry_limit: env::var("METADATA_RETRY_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.metadata_retry_limit),
        }
    }
}
