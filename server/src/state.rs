use folio_config::{AuthConfig, VerifierKind};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Principal;
use crate::circuit_breaker::CircuitBreaker;
use crate::jwt::JwtVerifier;
use crate::supabase_client::{RetryPolicy, SupabaseClientError, SupabaseVerifier};
use crate::token_cache::{SharedVerifier, TokenVerificationCache};
use crate::verifier::UnconfiguredVerifier;

pub struct AppState {
    pub token_cache: Arc<TokenVerificationCache<Principal>>,
}

impl AppState {
    #[must_use]
    pub const fn new(token_cache: Arc<TokenVerificationCache<Principal>>) -> Self {
        Self { token_cache }
    }

    /// Build the configured verifier and start a token cache around it.
    pub fn from_config(auth: &AuthConfig) -> Result<Self, StartupError> {
        let verifier = build_verifier(auth)?;
        let cache = TokenVerificationCache::start(&auth.token_cache, verifier);
        Ok(Self::new(Arc::new(cache)))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{0:?} verifier selected but its credentials are not configured")]
    VerifierNotConfigured(VerifierKind),

    #[error("failed to build Supabase client: {0}")]
    Supabase(#[from] SupabaseClientError),
}

pub fn build_verifier(auth: &AuthConfig) -> Result<SharedVerifier<Principal>, StartupError> {
    if !auth.verifier_configured() {
        if auth.require_verifier {
            return Err(StartupError::VerifierNotConfigured(auth.verifier));
        }
        tracing::warn!(
            verifier = ?auth.verifier,
            "Identity verifier not configured; all authenticated requests will get 503"
        );
        return Ok(Arc::new(UnconfiguredVerifier::<Principal>::new(format!(
            "{:?} verifier is not configured",
            auth.verifier
        ))));
    }

    match auth.verifier {
        VerifierKind::Supabase => {
            let resilience = &auth.resilience;
            let breaker = Arc::new(CircuitBreaker::new(
                resilience.failure_threshold,
                Duration::from_secs(resilience.recovery_timeout_secs),
            ));
            let verifier = SupabaseVerifier::new(
                auth.supabase_url.as_deref().unwrap_or_default(),
                auth.supabase_anon_key.as_deref().unwrap_or_default(),
                Duration::from_millis(auth.request_timeout_ms),
                breaker,
                RetryPolicy {
                    max_attempts: resilience.max_retry_attempts,
                    base_delay: Duration::from_millis(resilience.base_delay_ms),
                },
            )?;
            tracing::info!(url = ?auth.supabase_url, "Verifying tokens against Supabase Auth");
            Ok(Arc::new(verifier))
        }
        VerifierKind::Jwt => {
            tracing::info!(issuer = ?auth.issuer, audience = ?auth.audience, "Verifying tokens locally");
            Ok(Arc::new(JwtVerifier::new(
                auth.jwt_secret.as_deref().unwrap_or_default(),
                auth.issuer.as_deref(),
                auth.audience.as_deref(),
            )))
        }
    }
}
