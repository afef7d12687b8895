use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
    routing::get,
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static OBSERVABILITY_ENABLED: OnceLock<bool> = OnceLock::new();

/// Check if observability is enabled via OBSERVABILITY_ENABLED env var
pub fn is_observability_enabled() -> bool {
    *OBSERVABILITY_ENABLED.get_or_init(|| {
        std::env::var("OBSERVABILITY_ENABLED")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true) // Enabled by default
    })
}

/// Initialize Prometheus metrics exporter with upkeep task
/// Returns None if observability is disabled
pub fn init_metrics() -> Option<PrometheusHandle> {
    if !is_observability_enabled() {
        return None;
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5,
                10.0,
            ],
        )
        .expect("Failed to set buckets")
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    // Spawn upkeep task to clean stale metrics
    let upkeep_handle = handle.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            upkeep_handle.run_upkeep();
        }
    });

    Some(handle)
}

/// Metrics middleware to track HTTP requests
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    if !is_observability_enabled() {
        return next.run(req).await;
    }

    let start = Instant::now();
    let method = req.method().as_str().to_owned();
    let uri_path = req.uri().path().to_owned();

    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or(uri_path);

    gauge!("http_requests_active").increment(1.0);

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();
    let status_str = status.to_string();

    counter!("http_requests_total", "method" => method.clone(), "path" => path.clone(), "status" => status_str).increment(1);

    histogram!("http_request_duration_seconds", "method" => method, "path" => path).record(latency);

    let status_category = match status {
        200..=299 => "2xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };
    counter!("http_requests_by_status", "status_category" => status_category).increment(1);

    gauge!("http_requests_active").decrement(1.0);

    response
}

/// Router for metrics server
pub fn metrics_app(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}

// Business metrics helpers

pub fn track_registration_attempt(role: &str) {
    if !is_observability_enabled() {
        return;
    }
    counter!("registrations_total", "role" => role.to_string()).increment(1);
}

pub fn track_registration_deferred(role: &str) {
    if !is_observability_enabled() {
        return;
    }
    counter!("registrations_deferred_total", "role" => role.to_string()).increment(1);
}

pub fn track_profile_provisioned(role: &str) {
    if !is_observability_enabled() {
        return;
    }
    counter!("profiles_provisioned_total", "role" => role.to_string()).increment(1);
}

pub fn track_metadata_retry() {
    if !is_observability_enabled() {
        return;
    }
    counter!("signup_metadata_retries_total").increment(1);
}

pub fn track_enrollment_reallocation() {
    if !is_observability_enabled() {
        return;
    }
    counter!("enrollment_reallocations_total").increment(1);
}

pub fn track_approval_decision(action: &str, approver_role: &str) {
    if !is_observability_enabled() {
        return;
    }
    counter!("approval_decisions_total", "action" => action.to_string(), "approver_role" => approver_role.to_string()).increment(1);
}

#[allow(dead_code)]
pub fn track_policy_denial(operation: &str) {
    if !is_observability_enabled() {
        return;
    }
    counter!("policy_denials_total", "operation" => operation.to_string()).increment(1);
}

#[allow(dead_code)]
pub fn set_pending_profiles(count: i64) {
    if !is_observability_enabled() {
        return;
    }
    gauge!("profiles_pending_total").set(count as f64);
}
