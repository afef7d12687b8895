use axum::{Router, routing::get};

use crate::state::AppState;

use super::controller::{get_own_profile, get_profile, list_pending};

pub fn init_profiles_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_own_profile))
        .route("/pending", get(list_pending))
        .route("/{id}", get(get_profile))
}
