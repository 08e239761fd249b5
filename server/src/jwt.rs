//! Local verification of Supabase-issued HS256 access tokens.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::Principal;
use crate::verifier::{RemoteIdentityVerifier, Verified, VerifyFailure};

/// The subset of Supabase access-token claims the gateway uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseClaims {
    pub sub: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl From<SupabaseClaims> for Principal {
    fn from(claims: SupabaseClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);

        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        match audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn decode(&self, token: &str) -> Result<SupabaseClaims, jsonwebtoken::errors::Error> {
        Ok(decode::<SupabaseClaims>(token, &self.key, &self.validation)?.claims)
    }
}

#[async_trait]
impl RemoteIdentityVerifier for JwtVerifier {
    type Identity = Principal;

    async fn verify(&self, token: &str) -> Result<Verified<Principal>, VerifyFailure> {
        let claims = self
            .decode(token)
            .map_err(|e| VerifyFailure::Rejected(e.to_string()))?;
        let exp = claims.exp;
        Ok(Verified::new(Principal::from(claims)).with_expiry(exp))
    }
}

#[derive(Deserialize)]
struct ExpiryOnly {
    exp: u64,
}

/// Read the `exp` claim without checking the signature. Only for tokens
/// another party has already vouched for.
pub fn unverified_expiry(token: &str) -> Option<u64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    decode::<ExpiryOnly>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims.exp)
}
