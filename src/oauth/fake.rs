//! Scripted in-process `IdentityProvider` for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::device::poller::{PollObserver, PollProgress};
use crate::device::session::DeviceAuthorizationSession;
use crate::error::{GrantflowError, PollingError};
use crate::oauth::provider::{IdentityProvider, TokenPoll};
use crate::oauth::token::{DeviceAuthorizationResponse, OAuthErrorBody};
use crate::types::{
    ClientCredentials, ExchangeRequest, TokenClaims, TokenSet, TokenTypeHint, UserInfo,
};

#[derive(Default)]
pub struct FakeProvider {
    pub(crate) polls: Mutex<VecDeque<Result<TokenPoll, PollingError>>>,
    pub(crate) poll_delay: Option<Duration>,
    pub(crate) poll_calls: AtomicUsize,
    pub(crate) in_flight: Arc<AtomicUsize>,
    pub(crate) max_in_flight: AtomicUsize,
    pub device_response: Option<DeviceAuthorizationResponse>,
    pub user_info: Option<UserInfo>,
    pub fail_revocation: bool,
    pub revoked: Mutex<Vec<(String, TokenTypeHint)>>,
    pub claims: HashMap<String, TokenClaims>,
    pub exchange_error: Option<String>,
    pub exchanges: Mutex<Vec<ExchangeRequest>>,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeProvider {
    /// Queue of token endpoint answers; once drained every poll is `authorization_pending`.
    pub fn with_polls(polls: Vec<Result<TokenPoll, PollingError>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
            ..Default::default()
        }
    }

    pub fn with_poll_delay(mut self, delay: Duration) -> Self {
        self.poll_delay = Some(delay);
        self
    }

    pub fn with_claims(mut self, token: &str, sub: &str, scopes: &[&str]) -> Self {
        self.claims.insert(
            token.to_string(),
            TokenClaims {
                active: true,
                sub: Some(sub.to_string()),
                client_id: None,
                aud: None,
                scope: Some(scopes.join(" ")),
                scp: None,
                exp: None,
            },
        );
        self
    }

    pub fn tokens(access_token: &str) -> TokenSet {
        TokenSet {
            access_token: access_token.to_string(),
            token_type: "Bearer".into(),
            expires_in: Some(3600),
            scope: Some("openid profile offline_access".into()),
            refresh_token: Some(format!("{access_token}-refresh")),
            id_token: None,
            expires_at: None,
        }
    }

    pub fn poll_count(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.lock().unwrap().len()
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn request_device_authorization(
        &self,
        _client_id: &str,
        _scopes: &[String],
    ) -> Result<DeviceAuthorizationResponse, GrantflowError> {
        self.device_response.clone().ok_or_else(|| {
            GrantflowError::AuthRequest("Device authorization failed: invalid_client".into())
        })
    }

    async fn poll_device_token(
        &self,
        _client_id: &str,
        _device_code: &str,
    ) -> Result<TokenPoll, GrantflowError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(self.in_flight.clone());
        if let Some(delay) = self.poll_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.polls.lock().unwrap().pop_front();
        match next {
            Some(result) => result.map_err(GrantflowError::from),
            None => Ok(TokenPoll::Rejected(OAuthErrorBody {
                error: "authorization_pending".into(),
                error_description: None,
            })),
        }
    }

    async fn fetch_user_info(&self, _access_token: &str) -> Result<UserInfo, GrantflowError> {
        self.user_info.clone().ok_or_else(|| {
            GrantflowError::UserInfo("Failed to get user information: Unauthorized".into())
        })
    }

    async fn revoke_token(
        &self,
        _client_id: &str,
        token: &str,
        hint: TokenTypeHint,
    ) -> Result<(), GrantflowError> {
        if self.fail_revocation {
            return Err(GrantflowError::Revocation(
                "Failed to revoke token: Network error".into(),
            ));
        }
        self.revoked.lock().unwrap().push((token.to_string(), hint));
        Ok(())
    }

    async fn exchange_token(
        &self,
        _credentials: &ClientCredentials,
        request: &ExchangeRequest,
    ) -> Result<TokenSet, GrantflowError> {
        self.exchanges.lock().unwrap().push(request.clone());
        match self.exchange_error {
            Some(ref e) => Err(GrantflowError::Exchange(e.clone())),
            None => Ok(Self::tokens("exchanged-token")),
        }
    }

    async fn introspect_token(
        &self,
        _credentials: &ClientCredentials,
        token: &str,
    ) -> Result<TokenClaims, GrantflowError> {
        Ok(self.claims.get(token).cloned().unwrap_or(TokenClaims {
            active: false,
            sub: None,
            client_id: None,
            aud: None,
            scope: None,
            scp: None,
            exp: None,
        }))
    }
}

/// Observer that records what it was told.
#[derive(Default, Clone)]
pub struct RecordingObserver {
    pub events: Arc<Mutex<Vec<&'static str>>>,
    pub intervals: Arc<Mutex<Vec<u64>>>,
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl PollObserver for RecordingObserver {
    fn on_started(&mut self, _session: &DeviceAuthorizationSession) {
        self.events.lock().unwrap().push("started");
    }

    fn on_progress(&mut self, progress: &PollProgress) {
        self.events.lock().unwrap().push("progress");
        self.intervals.lock().unwrap().push(progress.interval_secs);
    }

    fn on_success(&mut self, _tokens: &TokenSet) {
        self.events.lock().unwrap().push("success");
    }

    fn on_error(&mut self, error: &PollingError) {
        self.events.lock().unwrap().push("error");
        self.errors.lock().unwrap().push(error.to_string());
    }
}
