use std::env;

/// Hosted identity provider endpoint configuration. When `IDENTITY_PROVIDER_URL`
/// is unset the application falls back to the embedded provider, which is
/// only suitable for development.
#[derive(Clone, Debug)]
pub struct IdentityProviderConfig {
    pub base_url: String,
    pub api_key: String,
}

impl IdentityProviderConfig {
    pub fn from_env() -> Option<Self> {
        let base_url = env::var("IDENTITY_PROVIDER_URL").ok()?;
        Some(Self {
            base_url,
            api_key: env::var("IDENTITY_PROVIDER_API_KEY").unwrap_or_default(),
        })
    }
}
