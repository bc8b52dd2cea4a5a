use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::error::GrantflowError;
use crate::oauth::provider::IdentityProvider;
use crate::oauth::token::decode_jwt_claims;
use crate::relay::guard::AccessGuard;
use crate::types::{ClientCredentials, ExchangeRequest, TokenClaims};

/// Where exchanged tokens are spent.
#[derive(Debug, Clone)]
pub struct Downstream {
    pub base_url: String,
    pub audience: String,
    pub scopes: Vec<String>,
}

impl Downstream {
    pub fn payments_url(&self) -> String {
        format!("{}/api/payments", self.base_url.trim_end_matches('/'))
    }
}

/// Exchanges incoming user tokens for downstream-scoped tokens and calls the
/// downstream service with them.
#[derive(Debug, Clone)]
pub struct TokenExchangeRelay {
    guard: AccessGuard,
    exchange_provider: Arc<dyn IdentityProvider>,
    credentials: ClientCredentials,
    downstream: Downstream,
    client: reqwest::Client,
}

impl TokenExchangeRelay {
    pub fn new(
        guard: AccessGuard,
        exchange_provider: Arc<dyn IdentityProvider>,
        credentials: ClientCredentials,
        downstream: Downstream,
    ) -> Self {
        Self {
            guard,
            exchange_provider,
            credentials,
            downstream,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn downstream(&self) -> &Downstream {
        &self.downstream
    }

    /// Trade `subject_token` for a token aimed at `target_audience`.
    pub async fn exchange_token(
        &self,
        subject_token: &str,
        target_audience: &str,
        target_scopes: &[String],
    ) -> Result<String, GrantflowError> {
        log_claims("subject", subject_token);
        let request = ExchangeRequest {
            subject_token: subject_token.to_string(),
            target_audience: target_audience.to_string(),
            target_scopes: target_scopes.to_vec(),
        };
        let tokens = match self
            .exchange_provider
            .exchange_token(&self.credentials, &request)
            .await
        {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(audience = target_audience, "{e}");
                return Err(e);
            }
        };
        tracing::info!(audience = target_audience, "token exchange successful");
        log_claims("exchanged", &tokens.access_token);
        Ok(tokens.access_token)
    }

    /// Exchange for the configured downstream audience and scopes.
    pub async fn exchange_for_downstream(
        &self,
        subject_token: &str,
    ) -> Result<String, GrantflowError> {
        self.exchange_token(
            subject_token,
            &self.downstream.audience,
            &self.downstream.scopes,
        )
        .await
    }

    /// POST `payload` to the downstream payments endpoint with the exchanged token.
    pub async fn forward_to_downstream(
        &self,
        exchanged_token: &str,
        payload: &Value,
    ) -> Result<Value, GrantflowError> {
        let url = self.downstream.payments_url();
        let resp = self
            .client
            .post(&url)
            .bearer_auth(exchanged_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| GrantflowError::Downstream {
                status: 502,
                body: format!("request to {url} failed: {e}"),
            })?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), url = %url, "downstream call failed");
            return Err(GrantflowError::Downstream {
                status: status.as_u16(),
                body,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| GrantflowError::Downstream {
            status: 502,
            body: format!("invalid JSON from downstream: {e}"),
        })
    }

    /// Verify `subject_token`, require `required_scopes`, then run `action`
    /// with the verified claims. The action is not run when any check fails.
    pub async fn handle_privileged_request<F, Fut, T>(
        &self,
        subject_token: Option<&str>,
        required_scopes: &[&str],
        action: F,
    ) -> Result<T, GrantflowError>
    where
        F: FnOnce(TokenClaims) -> Fut,
        Fut: Future<Output = Result<T, GrantflowError>>,
    {
        let claims = self.guard.authorize(subject_token, required_scopes).await?;
        action(claims).await
    }
}

fn log_claims(label: &str, token: &str) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    match decode_jwt_claims(token) {
        Some(claims) => tracing::debug!(token = label, %claims, "token claims"),
        None => tracing::debug!(token = label, "token is not a JWT"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::fake::FakeProvider;

    fn relay(provider: Arc<FakeProvider>) -> TokenExchangeRelay {
        let credentials = ClientCredentials {
            client_id: "store".into(),
            client_secret: "secret".into(),
        };
        let guard = AccessGuard::new(provider.clone(), credentials.clone(), "");
        TokenExchangeRelay::new(
            guard,
            provider,
            credentials,
            Downstream {
                base_url: "http://127.0.0.1:9/".into(),
                audience: "api://payment-service".into(),
                scopes: vec!["payments:manage".into(), "payments:view".into()],
            },
        )
    }

    #[test]
    fn payments_url_joins_cleanly() {
        let provider = Arc::new(FakeProvider::default());
        assert_eq!(
            relay(provider).downstream().payments_url(),
            "http://127.0.0.1:9/api/payments"
        );
    }

    #[tokio::test]
    async fn exchange_uses_downstream_audience_and_scopes() {
        let provider = Arc::new(FakeProvider::default());
        let token = relay(provider.clone())
            .exchange_for_downstream("subject")
            .await
            .unwrap();
        assert_eq!(token, "exchanged-token");

        let exchanges = provider.exchanges.lock().unwrap().clone();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0].subject_token, "subject");
        assert_eq!(exchanges[0].target_audience, "api://payment-service");
        assert_eq!(
            exchanges[0].target_scopes,
            vec!["payments:manage", "payments:view"]
        );
    }

    #[tokio::test]
    async fn exchange_failure_is_reported() {
        let provider = Arc::new(FakeProvider {
            exchange_error: Some("invalid_grant: subject token expired".into()),
            ..Default::default()
        });
        let err = relay(provider)
            .exchange_token("subject", "api://payment-service", &[])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Token exchange failed: invalid_grant: subject token expired"
        );
    }

    #[tokio::test]
    async fn insufficient_scope_skips_action_and_exchange() {
        let provider =
            Arc::new(FakeProvider::default().with_claims("user-token", "u1", &["store:purchase"]));
        let relay = relay(provider.clone());
        let mut ran = false;

        let err = relay
            .handle_privileged_request(Some("user-token"), &["store:manage"], |_claims| {
                ran = true;
                async { relay.exchange_for_downstream("user-token").await }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GrantflowError::InsufficientScope { .. }));
        assert!(!ran);
        assert_eq!(provider.exchange_count(), 0);
    }

    #[tokio::test]
    async fn privileged_request_runs_action_with_claims() {
        let provider =
            Arc::new(FakeProvider::default().with_claims("user-token", "u1", &["store:purchase"]));
        let relay = relay(provider.clone());

        let sub = relay
            .handle_privileged_request(Some("user-token"), &["store:purchase"], |claims| async move {
                Ok(claims.subject().to_string())
            })
            .await
            .unwrap();
        assert_eq!(sub, "u1");
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let relay = relay(Arc::new(FakeProvider::default()));
        let err = relay
            .handle_privileged_request(None, &[], |_| async { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No authorization token provided");
    }
}
