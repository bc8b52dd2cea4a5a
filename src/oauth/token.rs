use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::TokenSet;

pub const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
pub const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Default poll interval when the provider omits `interval`.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Raw token response from the OAuth server.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub scope: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// `now + secs`, saturating at the latest representable instant for
/// lifetimes chrono cannot hold.
pub fn expiry_after(secs: u64) -> DateTime<Utc> {
    let now = Utc::now();
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl TokenResponse {
    pub fn into_token_set(self) -> TokenSet {
        let expires_at = self.expires_in.map(expiry_after);
        TokenSet {
            access_token: self.access_token,
            token_type: self.token_type,
            expires_in: self.expires_in,
            scope: self.scope,
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            expires_at,
        }
    }
}

/// OAuth error body (RFC 6749 section 5.2).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    /// Parse an error response body, falling back to a synthetic `server_error`
    /// carrying the raw text (or status) when the body is not OAuth JSON.
    pub fn from_response_text(status: reqwest::StatusCode, body: &str) -> Self {
        if let Ok(parsed) = serde_json::from_str::<OAuthErrorBody>(body) {
            return parsed;
        }
        let description = if body.trim().is_empty() {
            status
                .canonical_reason()
                .map(String::from)
                .unwrap_or_else(|| status.to_string())
        } else {
            body.trim().to_string()
        };
        OAuthErrorBody {
            error: "server_error".to_string(),
            error_description: Some(description),
        }
    }

    /// `error_description` when present, else the error code.
    pub fn message(&self) -> &str {
        match self.error_description.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => &self.error,
        }
    }
}

/// Raw device authorization response (RFC 8628 section 3.2).
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorizationResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub interval: Option<u64>,
}

/// Decode a JWT payload without verifying its signature.
///
/// Only for debug output; never use the result for access decisions.
pub fn decode_jwt_claims(token: &str) -> Option<serde_json::Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_into_token_set() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{
                "access_token": "at",
                "token_type": "Bearer",
                "expires_in": 3600,
                "scope": "openid profile offline_access",
                "refresh_token": "rt"
            }"#,
        )
        .unwrap();
        let tokens = resp.into_token_set();
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt"));
        assert_eq!(tokens.expires_in, Some(3600));
        assert!(tokens.expires_at.is_some());
        assert!(!tokens.is_expired());
    }

    #[test]
    fn token_response_without_optional_fields() {
        let resp: TokenResponse = serde_json::from_str(r#"{"access_token": "at"}"#).unwrap();
        let tokens = resp.into_token_set();
        assert_eq!(tokens.token_type, "Bearer");
        assert!(tokens.expires_at.is_none());
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn out_of_range_lifetime_saturates() {
        let resp: TokenResponse = serde_json::from_str(
            r#"{"access_token": "at", "expires_in": 100000000000000000}"#,
        )
        .unwrap();
        let tokens = resp.into_token_set();
        assert_eq!(tokens.expires_at, Some(DateTime::<Utc>::MAX_UTC));
        assert!(!tokens.is_expired());
        assert_eq!(expiry_after(u64::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn error_body_parsed_from_json() {
        let body = OAuthErrorBody::from_response_text(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":"authorization_pending","error_description":"The device authorization is pending."}"#,
        );
        assert_eq!(body.error, "authorization_pending");
        assert_eq!(body.message(), "The device authorization is pending.");
    }

    #[test]
    fn error_body_falls_back_for_non_json() {
        let body = OAuthErrorBody::from_response_text(
            reqwest::StatusCode::BAD_GATEWAY,
            "upstream unavailable",
        );
        assert_eq!(body.error, "server_error");
        assert_eq!(body.message(), "upstream unavailable");

        let body = OAuthErrorBody::from_response_text(reqwest::StatusCode::BAD_GATEWAY, "");
        assert_eq!(body.message(), "Bad Gateway");
    }

    #[test]
    fn device_response_interval_optional() {
        let resp: DeviceAuthorizationResponse = serde_json::from_str(
            r#"{
                "device_code": "dc",
                "user_code": "ABC-123",
                "verification_uri": "/activate",
                "expires_in": 600
            }"#,
        )
        .unwrap();
        assert!(resp.interval.is_none());
        assert!(resp.verification_uri_complete.is_none());
    }

    #[test]
    fn decode_claims_from_unsigned_jwt() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"00u1","scp":["store:view"]}"#);
        let token = format!("eyJhbGciOiJub25lIn0.{payload}.sig");
        let claims = decode_jwt_claims(&token).unwrap();
        assert_eq!(claims["sub"], "00u1");
        assert_eq!(claims["scp"][0], "store:view");
    }

    #[test]
    fn decode_claims_rejects_opaque_tokens() {
        assert!(decode_jwt_claims("opaque-token").is_none());
        assert!(decode_jwt_claims("a.!!!.c").is_none());
    }
}
