#![allow(missing_docs)]

pub mod api;
pub mod auth;
pub mod circuit_breaker;
pub mod clock;
pub mod jwt;
pub mod metrics;
pub mod state;
pub mod supabase_client;
pub mod token_cache;
pub mod verifier;
