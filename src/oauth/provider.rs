use async_trait::async_trait;

use crate::error::{GrantflowError, PollingError};
use crate::oauth::discovery::Endpoints;
use crate::oauth::token::{
    DeviceAuthorizationResponse, OAuthErrorBody, TokenResponse, ACCESS_TOKEN_TYPE,
    DEVICE_CODE_GRANT, TOKEN_EXCHANGE_GRANT,
};
use crate::types::{
    ClientCredentials, ExchangeRequest, TokenClaims, TokenSet, TokenTypeHint, UserInfo,
};

impl std::fmt::Debug for dyn IdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProvider").finish()
    }
}

/// Result of one device-code token request.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenPoll {
    Granted(TokenSet),
    Rejected(OAuthErrorBody),
}

/// Everything the poller and relay need from the authorization server.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Start a device authorization (RFC 8628 section 3.1).
    async fn request_device_authorization(
        &self,
        client_id: &str,
        scopes: &[String],
    ) -> Result<DeviceAuthorizationResponse, GrantflowError>;

    /// Ask the token endpoint once whether the device code has been approved.
    ///
    /// OAuth error responses come back as `Ok(TokenPoll::Rejected)`; only
    /// transport failures are errors.
    async fn poll_device_token(
        &self,
        client_id: &str,
        device_code: &str,
    ) -> Result<TokenPoll, GrantflowError>;

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, GrantflowError>;

    async fn revoke_token(
        &self,
        client_id: &str,
        token: &str,
        hint: TokenTypeHint,
    ) -> Result<(), GrantflowError>;

    /// Token-exchange grant (RFC 8693) as a confidential client.
    async fn exchange_token(
        &self,
        credentials: &ClientCredentials,
        request: &ExchangeRequest,
    ) -> Result<TokenSet, GrantflowError>;

    /// Token introspection (RFC 7662) as a confidential client.
    async fn introspect_token(
        &self,
        credentials: &ClientCredentials,
        token: &str,
    ) -> Result<TokenClaims, GrantflowError>;
}

/// `IdentityProvider` over HTTP with reqwest.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpIdentityProvider {
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_client(reqwest::Client::new(), endpoints)
    }

    pub fn with_client(client: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }
}

async fn error_body(resp: reqwest::Response) -> OAuthErrorBody {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    OAuthErrorBody::from_response_text(status, &text)
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn request_device_authorization(
        &self,
        client_id: &str,
        scopes: &[String],
    ) -> Result<DeviceAuthorizationResponse, GrantflowError> {
        let scope = scopes.join(" ");
        tracing::debug!(client_id, scope = %scope, "requesting device authorization");
        let resp = self
            .client
            .post(&self.endpoints.device_authorization)
            .header("Accept", "application/json")
            .form(&[("client_id", client_id), ("scope", scope.as_str())])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("device authorization request failed: {e}");
                GrantflowError::AuthRequest(
                    "Failed to request device authorization: Network error".to_string(),
                )
            })?;

        if !resp.status().is_success() {
            let body = error_body(resp).await;
            return Err(GrantflowError::AuthRequest(format!(
                "Device authorization failed: {}",
                body.message()
            )));
        }

        resp.json().await.map_err(|e| {
            GrantflowError::AuthRequest(format!(
                "Failed to parse device authorization response: {e}"
            ))
        })
    }

    async fn poll_device_token(
        &self,
        client_id: &str,
        device_code: &str,
    ) -> Result<TokenPoll, GrantflowError> {
        let resp = self
            .client
            .post(&self.endpoints.token)
            .header("Accept", "application/json")
            .form(&[
                ("client_id", client_id),
                ("grant_type", DEVICE_CODE_GRANT),
                ("device_code", device_code),
            ])
            .send()
            .await
            .map_err(|e| PollingError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Ok(TokenPoll::Rejected(error_body(resp).await));
        }

        let token_resp: TokenResponse = resp.json().await.map_err(|e| PollingError::Provider {
            code: "invalid_response".to_string(),
            description: Some(format!("Failed to parse token response: {e}")),
        })?;
        Ok(TokenPoll::Granted(token_resp.into_token_set()))
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, GrantflowError> {
        let resp = self
            .client
            .get(&self.endpoints.userinfo)
            .header("Accept", "application/json")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|_| {
                GrantflowError::UserInfo("Failed to get user information: Network error".into())
            })?;

        if !resp.status().is_success() {
            let body = error_body(resp).await;
            return Err(GrantflowError::UserInfo(format!(
                "Failed to get user information: {}",
                body.message()
            )));
        }

        resp.json().await.map_err(|e| {
            GrantflowError::UserInfo(format!("Failed to parse user information: {e}"))
        })
    }

    async fn revoke_token(
        &self,
        client_id: &str,
        token: &str,
        hint: TokenTypeHint,
    ) -> Result<(), GrantflowError> {
        let resp = self
            .client
            .post(&self.endpoints.revocation)
            .header("Accept", "application/json")
            .form(&[
                ("token", token),
                ("token_type_hint", hint.as_str()),
                ("client_id", client_id),
            ])
            .send()
            .await
            .map_err(|_| GrantflowError::Revocation("Failed to revoke token: Network error".into()))?;

        if !resp.status().is_success() {
            let body = error_body(resp).await;
            return Err(GrantflowError::Revocation(format!(
                "Failed to revoke token: {}",
                body.message()
            )));
        }
        Ok(())
    }

    async fn exchange_token(
        &self,
        credentials: &ClientCredentials,
        request: &ExchangeRequest,
    ) -> Result<TokenSet, GrantflowError> {
        let scope = request.target_scopes.join(" ");
        let resp = self
            .client
            .post(&self.endpoints.token)
            .header("Accept", "application/json")
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[
                ("grant_type", TOKEN_EXCHANGE_GRANT),
                ("subject_token_type", ACCESS_TOKEN_TYPE),
                ("subject_token", request.subject_token.as_str()),
                ("audience", request.target_audience.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GrantflowError::Exchange(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = error_body(resp).await;
            let message = match body.error_description.as_deref() {
                Some(d) if !d.is_empty() => format!("{}: {d}", body.error),
                _ => body.error,
            };
            return Err(GrantflowError::Exchange(message));
        }

        let token_resp: TokenResponse = resp
            .json()
            .await
            .map_err(|e| GrantflowError::Exchange(format!("invalid token response: {e}")))?;
        Ok(token_resp.into_token_set())
    }

    async fn introspect_token(
        &self,
        credentials: &ClientCredentials,
        token: &str,
    ) -> Result<TokenClaims, GrantflowError> {
        let resp = self
            .client
            .post(&self.endpoints.introspection)
            .header("Accept", "application/json")
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("token introspection request failed: {e}");
                GrantflowError::Unauthenticated("Invalid token".into())
            })?;

        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "token introspection rejected");
            return Err(GrantflowError::Unauthenticated("Invalid token".into()));
        }

        resp.json().await.map_err(|e| {
            tracing::warn!("token introspection response unreadable: {e}");
            GrantflowError::Unauthenticated("Invalid token".into())
        })
    }
}
