use std::sync::Arc;

use serde::Serialize;

use crate::device::poller::{self, PollCanceller, PollObserver, PollStatus, PollTask};
use crate::device::session::DeviceAuthorizationSession;
use crate::error::GrantflowError;
use crate::oauth::provider::IdentityProvider;
use crate::types::{TokenSet, TokenTypeHint, UserInfo};

/// Lifecycle of a [`DeviceFlow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowState {
    Idle,
    Requested,
    Polling,
    Succeeded,
    Denied,
    Expired,
    Cancelled,
    Failed,
}

impl From<&PollStatus> for FlowState {
    fn from(status: &PollStatus) -> Self {
        match status {
            PollStatus::Pending => FlowState::Polling,
            PollStatus::Success(_) => FlowState::Succeeded,
            PollStatus::Denied => FlowState::Denied,
            PollStatus::Expired => FlowState::Expired,
            PollStatus::Cancelled => FlowState::Cancelled,
            PollStatus::Error(_) => FlowState::Failed,
        }
    }
}

/// User info after a successful login. Failing to load it does not fail the
/// login; the reason is kept instead.
#[derive(Debug, Clone, PartialEq)]
pub enum UserInfoOutcome {
    Loaded(UserInfo),
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct DeviceLogin {
    pub tokens: TokenSet,
    pub user_info: UserInfoOutcome,
}

/// What happened while signing out.
#[derive(Debug, Default)]
pub struct SignOutReport {
    pub revoked: Vec<TokenTypeHint>,
    pub failures: Vec<(TokenTypeHint, GrantflowError)>,
}

impl SignOutReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One device-authorization client session.
///
/// Owns at most one poll loop: requesting a new authorization, starting a new
/// poll, cancelling, disposing or dropping the flow all stop the previous loop.
pub struct DeviceFlow {
    provider: Arc<dyn IdentityProvider>,
    client_id: String,
    verification_base: String,
    state: FlowState,
    active: Option<PollCanceller>,
}

impl DeviceFlow {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        client_id: impl Into<String>,
        verification_base: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            client_id: client_id.into(),
            verification_base: verification_base.into(),
            state: FlowState::Idle,
            active: None,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> FlowState {
        match self.active {
            Some(ref active) => FlowState::from(&active.status()),
            None => self.state,
        }
    }

    /// Request a device code. Any running poll loop is stopped first.
    pub async fn request_authorization(
        &mut self,
        scopes: &[String],
    ) -> Result<DeviceAuthorizationSession, GrantflowError> {
        self.stop_active();
        self.state = FlowState::Idle;

        match self
            .provider
            .request_device_authorization(&self.client_id, scopes)
            .await
        {
            Ok(resp) => {
                let session =
                    DeviceAuthorizationSession::from_response(resp, &self.verification_base);
                tracing::info!(
                    user_code = %session.user_code,
                    verification_uri = %session.verification_uri,
                    interval_secs = session.poll_interval_secs,
                    "device authorization requested"
                );
                self.state = FlowState::Requested;
                Ok(session)
            }
            Err(e) => {
                self.state = FlowState::Failed;
                Err(e)
            }
        }
    }

    /// Start polling for `session`, replacing any loop already running.
    pub fn poll_for_tokens<O: PollObserver>(
        &mut self,
        session: DeviceAuthorizationSession,
        observer: O,
    ) -> PollTask {
        self.stop_active();
        let task = poller::spawn(
            self.provider.clone(),
            self.client_id.clone(),
            session,
            observer,
        );
        self.active = Some(task.canceller());
        task
    }

    /// Stop the current poll loop, if any. Safe to call repeatedly.
    pub fn cancel(&mut self) {
        match self.active.take() {
            Some(active) => {
                active.cancel();
                self.state = FlowState::from(&active.status());
            }
            None => {
                if self.state == FlowState::Requested {
                    self.state = FlowState::Cancelled;
                }
            }
        }
    }

    fn stop_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel();
        }
    }

    pub async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, GrantflowError> {
        self.provider.fetch_user_info(access_token).await
    }

    pub async fn revoke(&self, token: &str, hint: TokenTypeHint) -> Result<(), GrantflowError> {
        self.provider
            .revoke_token(&self.client_id, token, hint)
            .await
    }

    /// Request, poll and load user info in one go.
    pub async fn login<O: PollObserver>(
        &mut self,
        scopes: &[String],
        observer: O,
    ) -> Result<DeviceLogin, GrantflowError> {
        let session = self.request_authorization(scopes).await?;
        let tokens = self
            .poll_for_tokens(session, observer)
            .wait()
            .await
            .into_result()?;

        let user_info = match self.fetch_user_info(&tokens.access_token).await {
            Ok(info) => UserInfoOutcome::Loaded(info),
            Err(e) => {
                tracing::warn!("signed in without user info: {e}");
                UserInfoOutcome::Unavailable(e.to_string())
            }
        };
        Ok(DeviceLogin { tokens, user_info })
    }

    /// Revoke the refresh and access tokens, then tear the local session down
    /// whether or not revocation succeeded.
    pub async fn sign_out(&mut self, tokens: &TokenSet) -> SignOutReport {
        let mut report = SignOutReport::default();
        let mut targets = Vec::with_capacity(2);
        if let Some(ref refresh) = tokens.refresh_token {
            targets.push((refresh.as_str(), TokenTypeHint::RefreshToken));
        }
        targets.push((tokens.access_token.as_str(), TokenTypeHint::AccessToken));

        for (token, hint) in targets {
            match self.revoke(token, hint).await {
                Ok(()) => report.revoked.push(hint),
                Err(e) => {
                    tracing::warn!(hint = hint.as_str(), "token revocation failed: {e}");
                    report.failures.push((hint, e));
                }
            }
        }

        self.stop_active();
        self.state = FlowState::Idle;
        report
    }

    /// End the session, stopping any poll loop.
    pub fn dispose(mut self) {
        self.stop_active();
    }
}

impl Drop for DeviceFlow {
    fn drop(&mut self) {
        self.stop_active();
    }
}
