use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use rand::Rng;
use tracing::warn;

use crate::errors::ApiError;
use crate::state::AppState;

/// Characters used for human-facing codes; no 0/O or 1/I look-alikes
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates a 64 character hex access token from 32 random bytes
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Generates `prefix` followed by `len` random characters from [`CODE_ALPHABET`]
pub fn generate_code(prefix: &str, len: usize) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..len)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", prefix, suffix)
}

/// Extracts the token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Compares a presented secret with the configured one
///
/// An unset or empty configured secret never matches.
pub fn secrets_match(provided: Option<&str>, expected: Option<&str>) -> bool {
    let (Some(provided), Some(expected)) = (provided, expected) else {
        return false;
    };
    if expected.is_empty() || provided.len() != expected.len() {
        return false;
    }
    provided
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Reads a shared-secret header such as `x-webhook-secret`
pub fn header_secret<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

/// Rejects requests without the admin bearer token
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !secrets_match(bearer_token(request.headers()), state.config.admin_api_token.as_deref()) {
        warn!("Rejected admin request to {}", request.uri().path());
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

/// Rejects requests without the cron bearer secret
pub async fn require_cron(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !secrets_match(bearer_token(request.headers()), state.config.cron_secret.as_deref()) {
        warn!("Rejected cron request to {}", request.uri().path());
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_generate_code_uses_alphabet() {
        let code = generate_code("MR-", 6);
        assert!(code.starts_with("MR-"));
        assert_eq!(code.len(), 9);
        assert!(code[3..].bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer   xyz "));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match(Some("s3cret"), Some("s3cret")));
        assert!(!secrets_match(Some("s3cret"), Some("s3creT")));
        assert!(!secrets_match(Some("short"), Some("longer")));
        assert!(!secrets_match(None, Some("s3cret")));
    }

    #[test]
    fn test_unset_secret_rejects_everything() {
        assert!(!secrets_match(Some("anything"), None));
        assert!(!secrets_match(Some(""), Some("")));
    }
}
