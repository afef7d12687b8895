use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

use super::controller::{approve_all, approve_profile, list_actions, reject_profile};

pub fn init_approvals_router() -> Router<AppState> {
    Router::new()
        .route("/approve-all", post(approve_all))
        .route("/{profile_id}/approve", post(approve_profile))
        .route("/{profile_id}/reject", post(reject_profile))
        .route("/{profile_id}/actions", get(list_actions))
}
