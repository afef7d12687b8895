use std::sync::Arc;

use crate::config::cors::CorsConfig;
use crate::config::database::init_db_pool;
use crate::config::email::EmailConfig;
use crate::config::identity::IdentityProviderConfig;
use crate::config::rate_limit::RateLimitConfig;
use crate::config::registration::RegistrationConfig;
use crate::identity::http::HttpIdentityProvider;
use crate::identity::local::{LocalIdentityProvider, LocalProviderConfig};
use crate::identity::provider::IdentityProvider;
use crate::modules::profiles::allocator::{AllocatorKind, EnrollmentAllocator};
use crate::policy::memory::MemoryStore;
use crate::policy::postgres::PgProfileStore;
use crate::policy::store::ProfileStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProfileStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub allocator: Arc<dyn EnrollmentAllocator>,
    pub registration_config: RegistrationConfig,
    pub cors_config: CorsConfig,
    pub rate_limit_config: RateLimitConfig,
}

/// Wire up state from the environment. `DATABASE_URL` selects the Postgres
/// store (falling back to the in-memory store for local hacking), and
/// `IDENTITY_PROVIDER_URL` selects the hosted provider adapter (falling
/// back to the embedded one).
pub async fn init_app_state() -> AppState {
    let store: Arc<dyn ProfileStore> = if std::env::var("DATABASE_URL").is_ok() {
        Arc::new(PgProfileStore::new(init_db_pool().await))
    } else {
        tracing::warn!("DATABASE_URL not set; using the in-memory store");
        Arc::new(MemoryStore::new())
    };

    let identity: Arc<dyn IdentityProvider> = match IdentityProviderConfig::from_env() {
        Some(config) => Arc::new(HttpIdentityProvider::new(config)),
        None => {
            tracing::warn!("IDENTITY_PROVIDER_URL not set; using the embedded identity provider");
            Arc::new(LocalIdentityProvider::new(
                LocalProviderConfig::from_env(),
                EmailConfig::from_env(),
            ))
        }
    };

    AppState {
        store,
        identity,
        allocator: AllocatorKind::from_env().build(),
        registration_config: RegistrationConfig::from_env(),
        cors_config: CorsConfig::from_env(),
        rate_limit_config: RateLimitConfig::from_env(),
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl AppState {
    /// State over explicit collaborators, for tests.
    pub fn for_tests(
        store: Arc<dyn ProfileStore>,
        identity: Arc<dyn IdentityProvider>,
        allocator: Arc<dyn EnrollmentAllocator>,
    ) -> Self {
        Self {
            store,
            identity,
            allocator,
            registration_config: RegistrationConfig::default(),
            cors_config: CorsConfig {
                allowed_origins: vec!["http://localhost:5173".to_string()],
            },
            rate_limit_config: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
        }
    }
}
