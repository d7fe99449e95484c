pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::analysis::handlers::handle_get_analysis;
use crate::auth::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/auth/signin/email", post(handlers::handle_sign_in))
        .route(
            "/api/auth/callback/email",
            get(handlers::handle_email_callback),
        )
        .route("/api/auth/session", get(handlers::handle_get_session))
        .route("/api/auth/signout", post(handlers::handle_sign_out))
        // Analysis (read-only)
        .route("/api/analysis/:id", get(handle_get_analysis))
        .with_state(state)
}
