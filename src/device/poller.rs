use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::device::session::DeviceAuthorizationSession;
use crate::error::{GrantflowError, PollingError};
use crate::oauth::provider::{IdentityProvider, TokenPoll};
use crate::types::TokenSet;

pub const PENDING_MESSAGE: &str = "Waiting for user authorization...";
pub const SLOW_DOWN_MESSAGE: &str = "Rate limited, slowing down...";

/// Non-terminal update from the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollProgress {
    pub message: &'static str,
    pub attempt: u32,
    pub interval_secs: u64,
}

/// Receives poll loop notifications.
///
/// Callbacks run on the poll task while its state lock is held, so they must
/// be quick and must not cancel the task they are observing.
pub trait PollObserver: Send + 'static {
    fn on_started(&mut self, _session: &DeviceAuthorizationSession) {}
    fn on_progress(&mut self, _progress: &PollProgress) {}
    fn on_success(&mut self, _tokens: &TokenSet) {}
    fn on_error(&mut self, _error: &PollingError) {}
}

impl PollObserver for () {}

/// Where a poll task stands.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    Pending,
    Success(TokenSet),
    Denied,
    Expired,
    Cancelled,
    Error(PollingError),
}

impl PollStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollStatus::Pending)
    }

    /// Tokens on success; the terminal failure otherwise. A status that never
    /// reached a terminal state counts as cancelled.
    pub fn into_result(self) -> Result<TokenSet, PollingError> {
        match self {
            PollStatus::Success(tokens) => Ok(tokens),
            PollStatus::Denied => Err(PollingError::AccessDenied),
            PollStatus::Expired => Err(PollingError::Expired),
            PollStatus::Pending | PollStatus::Cancelled => Err(PollingError::Cancelled),
            PollStatus::Error(e) => Err(e),
        }
    }

    fn from_error(err: PollingError) -> Self {
        match err {
            PollingError::Expired => PollStatus::Expired,
            PollingError::AccessDenied => PollStatus::Denied,
            other => PollStatus::Error(other),
        }
    }
}

struct PollShared {
    closed: bool,
    status: PollStatus,
}

fn lock(shared: &Mutex<PollShared>) -> MutexGuard<'_, PollShared> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cancels a poll task. Cheap to clone; cancelling twice is a no-op.
#[derive(Clone)]
pub struct PollCanceller {
    shared: Arc<Mutex<PollShared>>,
    token: CancellationToken,
}

impl PollCanceller {
    /// Stop the loop. Once this returns, no observer callback fires and the
    /// task's status no longer changes.
    pub fn cancel(&self) {
        {
            let mut shared = lock(&self.shared);
            if !shared.closed {
                shared.closed = true;
                shared.status = PollStatus::Cancelled;
                tracing::debug!("device poll cancelled");
            }
        }
        self.token.cancel();
    }

    pub fn status(&self) -> PollStatus {
        lock(&self.shared).status.clone()
    }
}

/// Handle to a running poll loop.
pub struct PollTask {
    canceller: PollCanceller,
    handle: JoinHandle<PollStatus>,
}

impl PollTask {
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn canceller(&self) -> PollCanceller {
        self.canceller.clone()
    }

    pub fn status(&self) -> PollStatus {
        self.canceller.status()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to reach a terminal status.
    pub async fn wait(self) -> PollStatus {
        match self.handle.await {
            Ok(status) => status,
            Err(e) => PollStatus::Error(PollingError::Provider {
                code: "internal_error".to_string(),
                description: Some(format!("poll task failed: {e}")),
            }),
        }
    }
}

enum Tick {
    Granted(TokenSet),
    Pending,
    SlowDown,
    Failed(PollingError),
}

fn classify(result: Result<TokenPoll, GrantflowError>) -> Tick {
    match result {
        Ok(TokenPoll::Granted(tokens)) => Tick::Granted(tokens),
        Ok(TokenPoll::Rejected(body)) => match body.error.as_str() {
            "authorization_pending" => Tick::Pending,
            "slow_down" => Tick::SlowDown,
            "expired_token" => Tick::Failed(PollingError::Expired),
            "access_denied" => Tick::Failed(PollingError::AccessDenied),
            _ => Tick::Failed(PollingError::Provider {
                code: body.error,
                description: body.error_description,
            }),
        },
        Err(GrantflowError::Polling(e)) => Tick::Failed(e),
        Err(other) => Tick::Failed(PollingError::Network(other.to_string())),
    }
}

/// Spawn a poll loop for `session`. The first request goes out immediately;
/// each later one waits the session interval after the previous settled.
pub fn spawn<O: PollObserver>(
    provider: Arc<dyn IdentityProvider>,
    client_id: String,
    session: DeviceAuthorizationSession,
    mut observer: O,
) -> PollTask {
    observer.on_started(&session);
    let canceller = PollCanceller {
        shared: Arc::new(Mutex::new(PollShared {
            closed: false,
            status: PollStatus::Pending,
        })),
        token: CancellationToken::new(),
    };
    let span = tracing::info_span!("device_poll", user_code = %session.user_code);
    let poll_loop = PollLoop {
        provider,
        client_id,
        session,
        canceller: canceller.clone(),
        observer,
    };
    let handle = tokio::spawn(poll_loop.run().instrument(span));
    PollTask { canceller, handle }
}

struct PollLoop<O> {
    provider: Arc<dyn IdentityProvider>,
    client_id: String,
    session: DeviceAuthorizationSession,
    canceller: PollCanceller,
    observer: O,
}

impl<O: PollObserver> PollLoop<O> {
    async fn run(mut self) -> PollStatus {
        let mut attempt: u32 = 0;
        loop {
            if self.session.is_expired() {
                return self.fail(PollingError::Expired);
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = self.canceller.token.cancelled() => return PollStatus::Cancelled,
                r = self.provider.poll_device_token(&self.client_id, &self.session.device_code) => r,
            };

            let message = match classify(result) {
                Tick::Granted(tokens) => return self.succeed(tokens),
                Tick::Failed(err) => return self.fail(err),
                Tick::Pending => PENDING_MESSAGE,
                Tick::SlowDown => {
                    let interval = self.session.slow_down();
                    tracing::info!(interval_secs = interval, "provider asked to slow down");
                    SLOW_DOWN_MESSAGE
                }
            };
            let progress = PollProgress {
                message,
                attempt,
                interval_secs: self.session.poll_interval_secs,
            };
            if !self.notify_progress(&progress) {
                return PollStatus::Cancelled;
            }

            let wait = Duration::from_secs(self.session.poll_interval_secs);
            tokio::select! {
                biased;
                _ = self.canceller.token.cancelled() => return PollStatus::Cancelled,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn notify_progress(&mut self, progress: &PollProgress) -> bool {
        let shared = lock(&self.canceller.shared);
        if shared.closed {
            return false;
        }
        tracing::debug!(attempt = progress.attempt, "{}", progress.message);
        self.observer.on_progress(progress);
        true
    }

    fn succeed(&mut self, tokens: TokenSet) -> PollStatus {
        let mut shared = lock(&self.canceller.shared);
        if shared.closed {
            return PollStatus::Cancelled;
        }
        shared.closed = true;
        shared.status = PollStatus::Success(tokens.clone());
        tracing::info!("device authorization granted");
        self.observer.on_success(&tokens);
        PollStatus::Success(tokens)
    }

    fn fail(&mut self, err: PollingError) -> PollStatus {
        let mut shared = lock(&self.canceller.shared);
        if shared.closed {
            return PollStatus::Cancelled;
        }
        shared.closed = true;
        let status = PollStatus::from_error(err.clone());
        shared.status = status.clone();
        tracing::warn!(code = err.provider_code(), "device authorization failed: {err}");
        self.observer.on_error(&err);
        status
    }
}
