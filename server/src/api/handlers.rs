use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use super::models::{CacheStatsResponse, HealthResponse, LogoutResponse};
use crate::auth::{BearerToken, Principal};
use crate::state::AppState;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn me(Extension(principal): Extension<Principal>) -> Json<Principal> {
    Json(principal)
}

/// Forget the caller's token so the next request with it is re-verified.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Extension(BearerToken(token)): Extension<BearerToken>,
) -> Json<LogoutResponse> {
    let invalidated = state.token_cache.invalidate(&token).await;
    tracing::info!(user_id = %principal.user_id, "User logged out");
    Json(LogoutResponse { invalidated })
}

pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        stats: state.token_cache.stats().await,
        sweeper_running: state.token_cache.is_running(),
    })
}
