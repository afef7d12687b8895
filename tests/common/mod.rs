use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use enrolldesk::config::email::EmailConfig;
use enrolldesk::identity::local::{LocalIdentityProvider, LocalProviderConfig};
use enrolldesk::modules::profiles::allocator::{EnrollmentAllocator, SequenceAllocator};
use enrolldesk::policy::memory::MemoryStore;
use enrolldesk::router::init_router;
use enrolldesk::state::AppState;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub state: AppState,
    pub provider: Arc<LocalIdentityProvider>,
    pub store: Arc<MemoryStore>,
}

#[allow(dead_code)]
pub struct TestAppOptions {
    pub require_confirmation: bool,
    pub max_metadata_bytes: usize,
    pub allocator: Arc<dyn EnrollmentAllocator>,
}

impl Default for TestAppOptions {
    fn default() -> Self {
        Self {
            require_confirmation: false,
            max_metadata_bytes: 4096,
            allocator: Arc::new(SequenceAllocator),
        }
    }
}

pub fn setup_test_app() -> TestApp {
    setup_test_app_with(TestAppOptions::default())
}

#[allow(dead_code)]
pub fn setup_deferred_test_app() -> TestApp {
    setup_test_app_with(TestAppOptions {
        require_confirmation: true,
        ..TestAppOptions::default()
    })
}

#[allow(dead_code)]
pub fn setup_test_app_with(options: TestAppOptions) -> TestApp {
    let provider = Arc::new(LocalIdentityProvider::new(
        LocalProviderConfig {
            require_confirmation: options.require_confirmation,
            bcrypt_cost: 4,
            max_metadata_bytes: options.max_metadata_bytes,
            ..LocalProviderConfig::default()
        },
        EmailConfig::disabled(),
    ));
    let store = Arc::new(MemoryStore::new());
    let state = AppState::for_tests(store.clone(), provider.clone(), options.allocator);

    TestApp {
        state,
        provider,
        store,
    }
}

impl TestApp {
    pub fn router(&self) -> axum::Router {
        init_router(self.state.clone())
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Register, confirming the email first if the provider defers, and
    /// return an access token for the new account.
    #[allow(dead_code)]
    pub async fn register_and_login(&self, payload: Value) -> String {
        let email = payload["email"].as_str().unwrap().to_string();
        let password = payload["password"].as_str().unwrap().to_string();

        let (status, body) = self
            .request("POST", "/api/auth/register", None, Some(payload))
            .await;
        assert_eq!(status, StatusCode::CREATED, "registration failed: {body}");

        if body["requires_confirmation"] == true {
            let token = self
                .provider
                .confirmation_token_for(&email)
                .await
                .expect("pending confirmation token");
            let (status, body) = self
                .request("GET", &format!("/api/auth/confirm?token={token}"), None, None)
                .await;
            assert_eq!(status, StatusCode::OK, "confirmation failed: {body}");
        }

        self.login(&email, &password).await
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// The caller's own profile, as the API reports it.
    pub async fn own_profile(&self, token: &str) -> Value {
        let (status, body) = self
            .request("GET", "/api/profiles/me", Some(token), None)
            .await;
        assert_eq!(status, StatusCode::OK, "profile fetch failed: {body}");
        body
    }
}

pub fn generate_unique_email() -> String {
    format!("test-{}@test.com", Uuid::new_v4())
}

pub fn student_payload(email: &str) -> Value {
    json!({
        "role": "student",
        "full_name": "Asha Rao",
        "email": email,
        "password": "studentpass123",
        "student": {
            "class_level": "11",
            "guardian_name": "R Rao",
            "guardian_phone": "+15550100",
            "guardian_email": "guardian@example.com",
            "subjects": ["physics", "chemistry"],
            "batches": ["morning"]
        }
    })
}

pub fn teacher_payload(email: &str) -> Value {
    json!({
        "role": "teacher",
        "full_name": "T Varma",
        "email": email,
        "password": "teacherpass123",
        "teacher": {
            "specialization": "mathematics",
            "experience_years": 6
        }
    })
}

pub fn admin_payload(email: &str) -> Value {
    json!({
        "role": "admin",
        "full_name": "Root Admin",
        "email": email,
        "password": "adminpass123"
    })
}

/// `STU<year><month><4-digit sequence>`
#[allow(dead_code)]
pub fn assert_enrollment_code_shape(code: &str) {
    assert!(code.starts_with("STU"), "unexpected prefix: {code}");
    let digits = &code["STU".len()..];
    assert_eq!(digits.len(), 10, "unexpected code length: {code}");
    assert!(
        digits.chars().all(|c| c.is_ascii_digit()),
        "non-digit in code: {code}"
    );
}
