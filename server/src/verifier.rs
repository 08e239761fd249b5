//! Boundary to whatever service decides whether a bearer token is genuine.

use async_trait::async_trait;
use std::marker::PhantomData;

/// A successful verification.
#[derive(Debug, Clone)]
pub struct Verified<I> {
    pub identity: I,
    /// Absolute expiry of the token, in seconds since the Unix epoch.
    pub expiry_hint_secs: Option<u64>,
}

impl<I> Verified<I> {
    pub fn new(identity: I) -> Self {
        Self {
            identity,
            expiry_hint_secs: None,
        }
    }

    #[must_use]
    pub fn with_expiry(mut self, expiry_secs: u64) -> Self {
        self.expiry_hint_secs = Some(expiry_secs);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyFailure {
    /// The verifier looked at the token and said no.
    #[error("token rejected: {0}")]
    Rejected(String),

    /// The verifier could not give an answer (unreachable, timed out, not configured).
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RemoteIdentityVerifier: Send + Sync {
    type Identity: Clone + Send + Sync + 'static;

    async fn verify(&self, token: &str) -> Result<Verified<Self::Identity>, VerifyFailure>;
}

/// Stands in for a verifier whose credentials are missing. Every call fails
/// as unavailable so requests get a retryable 503 rather than a hard 401.
pub struct UnconfiguredVerifier<I> {
    reason: String,
    _identity: PhantomData<fn() -> I>,
}

impl<I> UnconfiguredVerifier<I> {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            _identity: PhantomData,
        }
    }
}

#[async_trait]
impl<I> RemoteIdentityVerifier for UnconfiguredVerifier<I>
where
    I: Clone + Send + Sync + 'static,
{
    type Identity = I;

    async fn verify(&self, _token: &str) -> Result<Verified<I>, VerifyFailure> {
        Err(VerifyFailure::Unavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_verifier_is_unavailable() {
        let verifier = UnconfiguredVerifier::<String>::new("SUPABASE_URL not set");
        let err = verifier.verify("anything").await.unwrap_err();
        assert_eq!(
            err,
            VerifyFailure::Unavailable("SUPABASE_URL not set".to_string())
        );
    }

    #[test]
    fn verified_with_expiry() {
        let v = Verified::new("user").with_expiry(1_700_000_000);
        assert_eq!(v.identity, "user");
        assert_eq!(v.expiry_hint_secs, Some(1_700_000_000));
    }
}
