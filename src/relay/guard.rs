use std::sync::Arc;

use crate::error::GrantflowError;
use crate::oauth::provider::IdentityProvider;
use crate::types::{ClientCredentials, TokenClaims};

pub const NO_TOKEN_MESSAGE: &str = "No authorization token provided";
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token";

/// Pull the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Fail with `InsufficientScope` unless `claims` carries every required scope.
pub fn require_scopes(claims: &TokenClaims, required: &[&str]) -> Result<(), GrantflowError> {
    if claims.has_scopes(required) {
        return Ok(());
    }
    Err(GrantflowError::InsufficientScope {
        required: required.iter().map(|s| s.to_string()).collect(),
        provided: claims.scopes(),
    })
}

/// Verifies incoming bearer tokens by introspection and checks their scopes.
#[derive(Debug, Clone)]
pub struct AccessGuard {
    provider: Arc<dyn IdentityProvider>,
    credentials: ClientCredentials,
    audience: Option<String>,
}

impl AccessGuard {
    /// `audience` is the `aud` every accepted token must carry; pass an empty
    /// string to accept any audience.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        credentials: ClientCredentials,
        audience: impl Into<String>,
    ) -> Self {
        let audience = audience.into();
        Self {
            provider,
            credentials,
            audience: (!audience.is_empty()).then_some(audience),
        }
    }

    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    /// Verify a token without checking scopes.
    pub async fn verify(&self, token: Option<&str>) -> Result<TokenClaims, GrantflowError> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(GrantflowError::Unauthenticated(NO_TOKEN_MESSAGE.into())),
        };

        let claims = self
            .provider
            .introspect_token(&self.credentials, token)
            .await?;

        if !claims.active {
            tracing::debug!("rejected inactive token");
            return Err(invalid_token());
        }
        if let Some(exp) = claims.exp {
            if exp <= chrono::Utc::now().timestamp() {
                tracing::debug!(exp, "rejected expired token");
                return Err(invalid_token());
            }
        }
        if let Some(ref expected) = self.audience {
            let matches = claims.aud.as_ref().is_some_and(|aud| aud.contains(expected));
            if !matches {
                tracing::debug!(expected = %expected, "rejected token for another audience");
                return Err(invalid_token());
            }
        }
        Ok(claims)
    }

    /// Verify a token and require every scope in `required`.
    pub async fn authorize(
        &self,
        token: Option<&str>,
        required: &[&str],
    ) -> Result<TokenClaims, GrantflowError> {
        let claims = self.verify(token).await?;
        if let Err(e) = require_scopes(&claims, required) {
            tracing::info!(sub = claims.subject(), "{e}");
            return Err(e);
        }
        Ok(claims)
    }
}

fn invalid_token() -> GrantflowError {
    GrantflowError::Unauthenticated(INVALID_TOKEN_MESSAGE.into())
}
