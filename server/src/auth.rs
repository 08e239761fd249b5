//! Bearer token extraction and the middleware that resolves it to a [`Principal`].

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;
use crate::token_cache::VerificationError;

/// Inline error response for auth failures (avoids coupling to api module).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    code: u16,
}

/// The verified user a bearer token resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Raw token of the current request, kept so logout can invalidate it.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Accepts both `Bearer <token>` and a bare token.
pub fn bearer_token(header_value: &str) -> &str {
    let value = header_value.trim();
    match value.strip_prefix("Bearer") {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => value,
    }
}

pub const fn status_for(err: &VerificationError) -> StatusCode {
    match err {
        VerificationError::MissingToken | VerificationError::InvalidToken(_) => {
            StatusCode::UNAUTHORIZED
        }
        VerificationError::VerifierUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

const fn public_message(err: &VerificationError) -> &'static str {
    match err {
        VerificationError::MissingToken => "Missing authorization token",
        VerificationError::InvalidToken(_) => "Invalid or expired token",
        VerificationError::VerifierUnavailable(_) => "Authentication service unavailable",
    }
}

pub fn error_response(err: &VerificationError) -> Response {
    let status = status_for(err);
    let body = Json(ErrorResponse {
        error: public_message(err),
        code: status.as_u16(),
    });

    if status == StatusCode::SERVICE_UNAVAILABLE {
        (status, [(header::RETRY_AFTER, "5")], body).into_response()
    } else {
        (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
    }
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = match request.headers().get(header::AUTHORIZATION) {
        None => String::new(),
        Some(value) => match value.to_str() {
            Ok(v) => bearer_token(v).to_owned(),
            Err(_) => {
                return error_response(&VerificationError::InvalidToken(
                    "Authorization header is not valid UTF-8".to_string(),
                ))
            }
        },
    };

    match state.token_cache.lookup_or_verify(&token).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            request.extensions_mut().insert(BearerToken(token));
            next.run(request).await
        }
        Err(e) => {
            if matches!(e, VerificationError::VerifierUnavailable(_)) {
                tracing::warn!(error = %e, "Rejecting request, identity verifier unavailable");
            }
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_prefix_is_stripped() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), "abc.def.ghi");
        assert_eq!(bearer_token("  Bearer   abc  "), "abc");
    }

    #[test]
    fn bare_token_is_accepted() {
        assert_eq!(bearer_token("abc.def.ghi"), "abc.def.ghi");
        assert_eq!(bearer_token("Bearerabc"), "Bearerabc");
    }

    #[test]
    fn empty_header_yields_empty_token() {
        assert_eq!(bearer_token(""), "");
        assert_eq!(bearer_token("Bearer "), "");
    }

    #[test]
    fn error_kinds_map_to_status() {
        assert_eq!(
            status_for(&VerificationError::MissingToken),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&VerificationError::InvalidToken("expired".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&VerificationError::VerifierUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn unavailable_response_asks_for_retry() {
        let resp = error_response(&VerificationError::VerifierUnavailable("down".into()));
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "5");

        let resp = error_response(&VerificationError::MissingToken);
        assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
