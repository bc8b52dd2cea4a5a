use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::oauth::token::{expiry_after, DeviceAuthorizationResponse, DEFAULT_POLL_INTERVAL_SECS};

/// Ceiling for the poll interval after repeated `slow_down` responses.
pub const MAX_POLL_INTERVAL_SECS: u64 = 60;

/// A pending device authorization, owned by the poll loop that services it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthorizationSession {
    #[serde(skip)]
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: String,
    pub expires_at: DateTime<Utc>,
    pub poll_interval_secs: u64,
}

impl DeviceAuthorizationSession {
    /// Build a session from the provider response, making verification URIs
    /// absolute against `verification_base`.
    pub fn from_response(resp: DeviceAuthorizationResponse, verification_base: &str) -> Self {
        let verification_uri = absolutize(verification_base, &resp.verification_uri);
        let verification_uri_complete = match resp.verification_uri_complete {
            Some(ref complete) if !complete.is_empty() => absolutize(verification_base, complete),
            _ => with_user_code(&verification_uri, &resp.user_code),
        };
        Self {
            device_code: resp.device_code,
            user_code: resp.user_code,
            verification_uri,
            verification_uri_complete,
            expires_at: expiry_after(resp.expires_in),
            poll_interval_secs: resp
                .interval
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Apply a `slow_down` response: double the interval, capped at
    /// [`MAX_POLL_INTERVAL_SECS`]. Returns the new interval.
    pub fn slow_down(&mut self) -> u64 {
        self.poll_interval_secs = next_interval(self.poll_interval_secs);
        self.poll_interval_secs
    }
}

pub fn next_interval(current: u64) -> u64 {
    current.max(1).saturating_mul(2).min(MAX_POLL_INTERVAL_SECS)
}

fn is_absolute(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Join a relative verification URI onto the base; absolute URIs pass through.
pub fn absolutize(base: &str, uri: &str) -> String {
    if is_absolute(uri) {
        return uri.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        uri.trim_start_matches('/')
    )
}

/// Append `user_code` as a query parameter unless the URI already carries one.
pub fn with_user_code(uri: &str, user_code: &str) -> String {
    match url::Url::parse(uri) {
        Ok(mut parsed) => {
            if parsed.query_pairs().any(|(k, _)| k == "user_code") {
                return uri.to_string();
            }
            parsed.query_pairs_mut().append_pair("user_code", user_code);
            parsed.to_string()
        }
        Err(_) => {
            if uri.contains("user_code=") {
                uri.to_string()
            } else if uri.contains('?') {
                format!("{uri}&user_code={user_code}")
            } else {
                format!("{uri}?user_code={user_code}")
            }
        }
    }
}
