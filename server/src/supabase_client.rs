//! Client for the Supabase Auth user endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::Principal;
use crate::circuit_breaker::CircuitBreaker;
use crate::jwt::unverified_expiry;
use crate::verifier::{RemoteIdentityVerifier, Verified, VerifyFailure};

/// User record returned by `GET /auth/v1/user`.
#[derive(Debug, Deserialize)]
pub struct SupabaseUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl From<SupabaseUser> for Principal {
    fn from(user: SupabaseUser) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SupabaseClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token rejected by Supabase (HTTP {status}): {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Supabase returned HTTP {status}: {body}")]
    Service { status: StatusCode, body: String },

    #[error("Supabase refused the gateway's API key (HTTP {status}): {body}")]
    ApiKeyRejected { status: StatusCode, body: String },

    #[error("circuit breaker is open, Supabase Auth presumed down")]
    CircuitOpen,
}

impl SupabaseClientError {
    const fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

impl From<SupabaseClientError> for VerifyFailure {
    fn from(err: SupabaseClientError) -> Self {
        if err.is_rejection() {
            Self::Rejected(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Verifies tokens by asking Supabase who they belong to.
#[derive(Clone)]
pub struct SupabaseVerifier {
    client: Client,
    base_url: String,
    anon_key: String,
    circuit_breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl SupabaseVerifier {
    /// # Arguments
    /// * `base_url` - Project URL, e.g. `https://abcd.supabase.co`
    /// * `anon_key` - Public anon key sent as the `apikey` header
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(
        base_url: &str,
        anon_key: &str,
        timeout: Duration,
        circuit_breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
    ) -> Result<Self, SupabaseClientError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            circuit_breaker,
            retry,
        })
    }

    /// Single call to `GET /auth/v1/user`, no retry.
    pub async fn get_user(&self, token: &str) -> Result<SupabaseUser, SupabaseClientError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        if is_api_key_complaint(&body) {
            return Err(SupabaseClientError::ApiKeyRejected { status, body });
        }
        if matches!(
            status,
            StatusCode::BAD_REQUEST
                | StatusCode::UNAUTHORIZED
                | StatusCode::FORBIDDEN
                | StatusCode::NOT_FOUND
                | StatusCode::UNPROCESSABLE_ENTITY
        ) {
            Err(SupabaseClientError::Rejected { status, body })
        } else {
            Err(SupabaseClientError::Service { status, body })
        }
    }

    /// `get_user` behind the circuit breaker, retrying transient failures with
    /// exponential backoff. Rejections are final and count as a healthy reply.
    pub async fn get_user_with_retry(
        &self,
        token: &str,
    ) -> Result<SupabaseUser, SupabaseClientError> {
        if !self.circuit_breaker.allow_request().await {
            return Err(SupabaseClientError::CircuitOpen);
        }

        let mut last_err = None;
        for attempt in 0..self.retry.max_attempts.max(1) {
            if attempt > 0 {
                let delay = self.retry.base_delay.saturating_mul(2u32.saturating_pow(attempt - 1));
                tokio::time::sleep(delay).await;
            }

            match self.get_user(token).await {
                Ok(user) => {
                    self.circuit_breaker.record_success().await;
                    return Ok(user);
                }
                Err(e) if e.is_rejection() => {
                    self.circuit_breaker.record_success().await;
                    return Err(e);
                }
                Err(e @ SupabaseClientError::ApiKeyRejected { .. }) => {
                    tracing::error!(error = %e, "Supabase anon key is missing or wrong");
                    self.circuit_breaker.record_failure().await;
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "Supabase get_user failed");
                    last_err = Some(e);
                }
            }
        }

        self.circuit_breaker.record_failure().await;
        Err(last_err.unwrap_or(SupabaseClientError::CircuitOpen))
    }
}

/// The Supabase API gateway answers a bad `apikey` header with 401 and a
/// message naming the key, before the user's token is even looked at.
fn is_api_key_complaint(body: &str) -> bool {
    body.to_ascii_lowercase().contains("api key")
}

#[async_trait]
impl RemoteIdentityVerifier for SupabaseVerifier {
    type Identity = Principal;

    async fn verify(&self, token: &str) -> Result<Verified<Principal>, VerifyFailure> {
        let user = self.get_user_with_retry(token).await?;
        let verified = Verified::new(Principal::from(user));
        Ok(match unverified_expiry(token) {
            Some(exp) => verified.with_expiry(exp),
            None => verified,
        })
    }
}
