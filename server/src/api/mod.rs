pub mod handlers;
pub mod models;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::auth;
use crate::state::AppState;

/// Routes under `/api/v1/auth` require a verified bearer token; `/health` does not.
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/v1/auth/me", get(handlers::me))
        .route("/api/v1/auth/logout", post(handlers::logout))
        .route("/api/v1/auth/cache", get(handlers::cache_stats))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
}
