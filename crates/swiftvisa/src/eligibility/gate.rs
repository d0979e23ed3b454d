use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;

/// Answers whether the caller behind a request has an authenticated session.
pub trait AuthGate: Send + Sync {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool;
}

/// Used when an upstream proxy already authenticated the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthGate for AllowAll {
    fn is_authenticated(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Requires `Authorization: Bearer <token>` matching a shared token.
#[derive(Clone)]
pub struct BearerTokenGate {
    token: String,
}

impl BearerTokenGate {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl AuthGate for BearerTokenGate {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|presented| token_matches(presented.trim(), &self.token))
            .unwrap_or(false)
    }
}

/// Slice `ct_eq` is constant time for equal lengths and false otherwise.
fn token_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
