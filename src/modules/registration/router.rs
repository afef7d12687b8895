use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

use super::controller::{confirm, login, register};

pub fn init_registration_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/confirm", get(confirm))
        .route("/login", post(login))
}
