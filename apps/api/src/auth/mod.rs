//! Request authentication. Identity is delegated to Clerk; this module only
//! verifies the session token the browser presents and exposes the user id.

pub mod clerk;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::errors::AppError;
use crate::state::AppState;

/// Clerk sets the session JWT in this cookie for same-site requests.
const SESSION_COOKIE: &str = "__session";

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Identity-provider user id (`sub` claim).
    pub user_id: String,
}

/// Verifies a session token. Carried in `AppState` as `Arc<dyn TokenVerifier>`.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthUser, AppError>;
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| session_cookie(parts))
            .ok_or(AppError::Unauthorized)?;
        state.verifier.verify(&token).await
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn session_cookie(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Accepts a fixed set of tokens. Used by handler tests.
#[cfg(test)]
pub struct StaticVerifier {
    tokens: std::collections::HashMap<String, AuthUser>,
}

#[cfg(test)]
impl StaticVerifier {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            tokens: entries
                .iter()
                .map(|(token, user_id)| {
                    (
                        token.to_string(),
                        AuthUser {
                            user_id: user_id.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, AppError> {
        self.tokens.get(token).cloned().ok_or(AppError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/resume");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_extracted() {
        let p = parts(&[("authorization", "Bearer abc.def.ghi")]);
        assert_eq!(bearer_token(&p).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_bearer_scheme_case_insensitive() {
        let p = parts(&[("authorization", "bearer tok")]);
        assert_eq!(bearer_token(&p).as_deref(), Some("tok"));
    }

    #[test]
    fn test_non_bearer_scheme_ignored() {
        let p = parts(&[("authorization", "Basic dXNlcjpwYXNz")]);
        assert!(bearer_token(&p).is_none());
        let p = parts(&[("authorization", "Bearer ")]);
        assert!(bearer_token(&p).is_none());
    }

    #[test]
    fn test_session_cookie_extracted() {
        let p = parts(&[("cookie", "theme=dark; __session=jwt123; other=1")]);
        assert_eq!(session_cookie(&p).as_deref(), Some("jwt123"));
    }

    #[test]
    fn test_missing_credentials() {
        let p = parts(&[("cookie", "theme=dark")]);
        assert!(bearer_token(&p).is_none());
        assert!(session_cookie(&p).is_none());
    }
}
