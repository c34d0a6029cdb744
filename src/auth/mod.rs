//! Service pre-shared key guard for the `/api` routes.
//!
//! The waiver service sits behind the membership backend; callers present the
//! shared key in `x-api-key` or as a bearer token. Keys are compared in
//! constant time.

use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject requests that do not carry the configured key. With no key
/// configured every request passes (local development).
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let matches = presented_key(request.headers()).map(|key| constant_time_compare(key, &expected));

    match matches {
        Some(true) => next.run(request).await,
        Some(false) => {
            tracing::debug!(path = %request.uri().path(), "Rejected request with wrong API key");
            AppError::Unauthorized("Invalid API key".to_string()).into_response()
        }
        None => AppError::Unauthorized("Missing API key".to_string()).into_response(),
    }
}

/// The key from `x-api-key`, falling back to `Authorization: Bearer`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("waiver-key", "waiver-key"));
        assert!(!constant_time_compare("waiver-key", "waiver-kez"));
        assert!(!constant_time_compare("short", "much-longer-key"));
        assert!(!constant_time_compare("", "not-empty"));
    }

    #[test]
    fn test_presented_key_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-bearer"));
        assert_eq!(presented_key(&headers), Some("from-bearer"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("from-header"));
        assert_eq!(presented_key(&headers), Some("from-header"));
    }

    #[test]
    fn test_presented_key_ignores_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_key(&headers), None);
    }
}
