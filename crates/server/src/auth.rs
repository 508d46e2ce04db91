//! Management API authentication.
//!
//! Registry and selector routes are guarded by a single bearer token whose
//! SHA256 hex is configured as `admin.token_hash`. Discovery, proxy, health
//! and metrics stay open for the scraper.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

/// Extract bearer token from Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(v[7..].trim())
            } else {
                None
            }
        })
}

/// SHA256 hex of a raw token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Reject management requests without the configured admin token.
///
/// Passes everything through when no token hash is configured.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.admin.token_hash.as_deref() else {
        return Ok(next.run(req).await);
    };

    let token = extract_bearer_token(&req)
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))?;

    if !hash_token(token).eq_ignore_ascii_case(expected) {
        tracing::warn!(
            method = %req.method(),
            uri = %req.uri(),
            "Rejected management request with invalid token"
        );
        return Err(ApiError::Unauthorized("invalid token".to_string()));
    }

    Ok(next.run(req).await)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promhub_core::config::AdminConfig;

    #[test]
    fn test_hash_matches_testing_config() {
        let expected = AdminConfig::for_testing().token_hash.unwrap();
        assert_eq!(hash_token("test-admin-token"), expected);
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        let req = Request::builder()
            .header(AUTHORIZATION, "BEARER abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), Some("abc"));

        let req = Request::builder()
            .header(AUTHORIZATION, "Basic abc")
            .body(axum::body::Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), None);
    }
}
