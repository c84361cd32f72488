use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use clerk_rs::apis::jwks_api::JwksKey;
use clerk_rs::clerk::Clerk;
use clerk_rs::validators::authorizer::{validate_jwt, ClerkError};
use clerk_rs::validators::jwks::{JwksProvider, JwksProviderError, MemoryCacheJwksProvider};
use clerk_rs::ClerkConfiguration;
use tracing::debug;

use crate::auth::{AuthUser, TokenVerifier};
use crate::errors::AppError;

/// Validates Clerk session JWTs against the instance JWKS.
///
/// The `MemoryCacheJwksProvider` caches the public keys, so only the first
/// request after a key rotation reaches the Clerk Backend API.
pub struct ClerkVerifier {
    provider: Arc<MemoryCacheJwksProvider>,
}

impl ClerkVerifier {
    pub fn new(secret_key: &str) -> Self {
        let config = ClerkConfiguration::new(None, None, Some(secret_key.to_string()), None);
        let clerk = Clerk::new(config);
        Self {
            provider: Arc::new(MemoryCacheJwksProvider::new(clerk)),
        }
    }
}

#[async_trait]
impl TokenVerifier for ClerkVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, AppError> {
        verify_with(token, self.provider.clone()).await
    }
}

/// `validate_jwt` reports every key lookup failure as an invalid token. This
/// wrapper remembers whether the lookup failed because the JWKS endpoint
/// could not be reached.
struct TrackedJwks<J> {
    inner: Arc<J>,
    fetch_failed: AtomicBool,
}

#[async_trait]
impl<J> JwksProvider for TrackedJwks<J>
where
    J: JwksProvider<Error = JwksProviderError> + Send + Sync,
{
    type Error = JwksProviderError;

    async fn get_key(&self, kid: &str) -> Result<JwksKey, Self::Error> {
        let result = self.inner.get_key(kid).await;
        if let Err(JwksProviderError::JwksApi) = result {
            self.fetch_failed.store(true, Ordering::SeqCst);
        }
        result
    }
}

/// Token problems are 401; a Clerk outage or a key the service cannot use is 500.
async fn verify_with<J>(token: &str, provider: Arc<J>) -> Result<AuthUser, AppError>
where
    J: JwksProvider<Error = JwksProviderError> + Send + Sync,
{
    let jwks = Arc::new(TrackedJwks {
        inner: provider,
        fetch_failed: AtomicBool::new(false),
    });

    match validate_jwt(token, jwks.clone()).await {
        Ok(jwt) => Ok(AuthUser { user_id: jwt.sub }),
        Err(_) if jwks.fetch_failed.load(Ordering::SeqCst) => Err(AppError::Internal(anyhow!(
            "could not fetch the Clerk JWKS"
        ))),
        Err(ClerkError::InternalServerError(msg)) => {
            Err(AppError::Internal(anyhow!("Clerk token validation failed: {msg}")))
        }
        Err(e) => {
            debug!("Session token rejected: {e}");
            Err(AppError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Header `{"alg":"RS256","typ":"JWT","kid":"ins_test"}`; payload and
    /// signature are never reached.
    const TOKEN: &str = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCIsImtpZCI6Imluc190ZXN0In0.e30.c2ln";

    struct FailingJwks(JwksProviderError);

    #[async_trait]
    impl JwksProvider for FailingJwks {
        type Error = JwksProviderError;

        async fn get_key(&self, _kid: &str) -> Result<JwksKey, Self::Error> {
            Err(self.0)
        }
    }

    #[tokio::test]
    async fn test_jwks_outage_is_internal_error() {
        let result = verify_with(TOKEN, Arc::new(FailingJwks(JwksProviderError::JwksApi))).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_unknown_key_is_unauthorized() {
        let result =
            verify_with(TOKEN, Arc::new(FailingJwks(JwksProviderError::UnknownKey))).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_garbage_token_is_unauthorized() {
        let result =
            verify_with("not-a-jwt", Arc::new(FailingJwks(JwksProviderError::JwksApi))).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }
}
