use serde::{Deserialize, Serialize};

use crate::token_cache::CacheStats;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogoutResponse {
    /// Whether a cached entry existed for the token.
    pub invalidated: bool,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub sweeper_running: bool,
}
